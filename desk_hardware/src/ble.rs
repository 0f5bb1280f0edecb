//! BlueZ/CoreBluetooth backend built on btleplug.
//!
//! btleplug is async; this adapter owns a small tokio runtime and blocks on
//! it for each call. Notifications are pumped by a task on the runtime's
//! worker thread, so sinks run on a context separate from the caller.
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic as GattCharacteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use desk_traits::{Characteristic, DeviceHandle, NotifySink, Transport, TransportError};
use futures::StreamExt;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{HwError, Result};

const DISCOVER_SERVICES_TIMEOUT: Duration = Duration::from_secs(15);
/// Default bound for GATT calls that take no explicit timeout.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Await a btleplug call for at most `limit`; elapsed maps to `HwError::Timeout`.
async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, btleplug::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Err(_) => Err(HwError::Timeout),
        Ok(Err(btleplug::Error::NotConnected)) => Err(HwError::Disconnected),
        Ok(Err(e)) => Err(HwError::Gatt(e.to_string())),
        Ok(Ok(v)) => Ok(v),
    }
}

pub struct BleTransport {
    rt: Runtime,
    adapter: Adapter,
    discovered: HashMap<String, Peripheral>,
    peripheral: Option<Peripheral>,
    notify_task: Option<JoinHandle<()>>,
    io_timeout: Duration,
}

impl BleTransport {
    /// Open the adapter whose info string contains `adapter_name` (e.g. "hci0"),
    /// falling back to the first adapter.
    pub fn new(adapter_name: &str) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let adapter = rt.block_on(async {
            let manager = Manager::new()
                .await
                .map_err(|e| HwError::Adapter(e.to_string()))?;
            let adapters = manager
                .adapters()
                .await
                .map_err(|e| HwError::Adapter(e.to_string()))?;
            let mut fallback = None;
            for adapter in adapters {
                let info = adapter.adapter_info().await.unwrap_or_default();
                if info.contains(adapter_name) {
                    return Ok(adapter);
                }
                if fallback.is_none() {
                    fallback = Some(adapter);
                }
            }
            fallback.ok_or_else(|| HwError::Adapter("no bluetooth adapter found".into()))
        })?;
        tracing::info!(adapter = adapter_name, "bluetooth adapter ready");
        Ok(Self {
            rt,
            adapter,
            discovered: HashMap::new(),
            peripheral: None,
            notify_task: None,
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    /// Bound for subscribe, unsubscribe, disconnect and scan start/stop.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn connected_peripheral(&self) -> Result<&Peripheral> {
        self.peripheral.as_ref().ok_or(HwError::NotConnected)
    }

    fn gatt_characteristic(&self, characteristic: Characteristic) -> Result<GattCharacteristic> {
        let uuid =
            Uuid::parse_str(characteristic.uuid()).map_err(|e| HwError::Gatt(e.to_string()))?;
        self.connected_peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| HwError::Gatt(format!("characteristic {uuid} not found")))
    }

    async fn collect(adapter: &Adapter, io: Duration) -> Vec<(DeviceHandle, Peripheral)> {
        let mut out = Vec::new();
        for p in bounded(io, adapter.peripherals()).await.unwrap_or_default() {
            if let Ok(Some(props)) = bounded(io, p.properties()).await {
                let mut handle = DeviceHandle::new(props.address.to_string());
                if let Some(name) = props.local_name {
                    handle = handle.with_name(name);
                }
                out.push((handle, p));
            }
        }
        out
    }
}

impl Transport for BleTransport {
    fn scan(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Vec<DeviceHandle>, TransportError> {
        let adapter = self.adapter.clone();
        let io = self.io_timeout;
        let found = self.rt.block_on(async move {
            bounded(io, adapter.start_scan(ScanFilter::default())).await?;
            tokio::time::sleep(timeout).await;
            bounded(io, adapter.stop_scan()).await.ok();
            Ok::<_, HwError>(Self::collect(&adapter, io).await)
        })?;
        let mut handles = Vec::with_capacity(found.len());
        for (handle, p) in found {
            self.discovered.insert(handle.address.to_ascii_uppercase(), p);
            handles.push(handle);
        }
        tracing::debug!(count = handles.len(), "scan complete");
        Ok(handles)
    }

    fn find(
        &mut self,
        address: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<DeviceHandle>, TransportError> {
        let adapter = self.adapter.clone();
        let wanted = address.to_string();
        let io = self.io_timeout;
        let hit = self.rt.block_on(async move {
            bounded(io, adapter.start_scan(ScanFilter::default())).await?;
            let search = async {
                loop {
                    for (handle, p) in Self::collect(&adapter, io).await {
                        if handle.matches(&wanted) {
                            return (handle, p);
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            };
            let res = tokio::time::timeout(timeout, search).await.ok();
            bounded(io, adapter.stop_scan()).await.ok();
            Ok::<_, HwError>(res)
        })?;
        Ok(hit.map(|(handle, p)| {
            self.discovered.insert(handle.address.to_ascii_uppercase(), p);
            handle
        }))
    }

    fn connect(
        &mut self,
        device: &DeviceHandle,
        timeout: Duration,
    ) -> std::result::Result<(), TransportError> {
        let key = device.address.to_ascii_uppercase();
        let peripheral = match self.discovered.get(&key).cloned() {
            Some(p) => p,
            // A cached address skips scanning; BlueZ still knows bonded devices.
            None => {
                let adapter = self.adapter.clone();
                let io = self.io_timeout;
                let known = self.rt.block_on(async move { Self::collect(&adapter, io).await });
                let p = known
                    .into_iter()
                    .find(|(h, _)| h.matches(&key))
                    .map(|(_, p)| p)
                    .ok_or_else(|| HwError::NotFound(device.address.clone()))?;
                self.discovered.insert(key, p.clone());
                p
            }
        };
        let p = peripheral.clone();
        self.rt.block_on(async move {
            bounded(timeout, p.connect()).await?;
            // BlueZ reports the link before the GATT cache is populated.
            #[cfg(target_os = "linux")]
            tokio::time::sleep(Duration::from_millis(600)).await;
            bounded(DISCOVER_SERVICES_TIMEOUT, p.discover_services()).await
        })?;
        tracing::info!(address = %device.address, "connected");
        self.peripheral = Some(peripheral);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        match &self.peripheral {
            Some(p) => self
                .rt
                .block_on(bounded(self.io_timeout, p.is_connected()))
                .unwrap_or(false),
            None => false,
        }
    }

    fn disconnect(&mut self) -> std::result::Result<(), TransportError> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        if let Some(p) = self.peripheral.take() {
            self.rt.block_on(bounded(self.io_timeout, p.disconnect()))?;
            tracing::info!("disconnected");
        }
        Ok(())
    }

    fn write(
        &mut self,
        characteristic: Characteristic,
        payload: &[u8],
        timeout: Duration,
    ) -> std::result::Result<(), TransportError> {
        let c = self.gatt_characteristic(characteristic)?;
        let p = self.connected_peripheral()?.clone();
        self.rt
            .block_on(bounded(timeout, p.write(&c, payload, WriteType::WithResponse)))?;
        Ok(())
    }

    fn read(
        &mut self,
        characteristic: Characteristic,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let c = self.gatt_characteristic(characteristic)?;
        let p = self.connected_peripheral()?.clone();
        let bytes = self.rt.block_on(bounded(timeout, p.read(&c)))?;
        Ok(bytes)
    }

    fn start_notify(
        &mut self,
        characteristic: Characteristic,
        sink: NotifySink,
    ) -> std::result::Result<(), TransportError> {
        let c = self.gatt_characteristic(characteristic)?;
        let p = self.connected_peripheral()?.clone();
        let uuid = c.uuid;
        let io = self.io_timeout;
        let mut stream = self.rt.block_on(async {
            bounded(io, p.subscribe(&c)).await?;
            bounded(io, p.notifications()).await
        })?;
        let task = self.rt.spawn(async move {
            while let Some(n) = stream.next().await {
                if n.uuid == uuid {
                    sink(&n.value);
                }
            }
            tracing::debug!("notification stream ended");
        });
        self.notify_task = Some(task);
        Ok(())
    }

    fn stop_notify(
        &mut self,
        characteristic: Characteristic,
    ) -> std::result::Result<(), TransportError> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        let c = self.gatt_characteristic(characteristic)?;
        let p = self.connected_peripheral()?.clone();
        self.rt.block_on(bounded(self.io_timeout, p.unsubscribe(&c)))?;
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
    }
}
