//! Discovery, connection and teardown.
use std::path::Path;
use std::sync::Arc;

use desk_config::{CachedDevice, load_device_cache, store_device_cache};
use desk_traits::{Characteristic, Clock, DeviceHandle, MonotonicClock, Transport};

use crate::config::ConnectionCfg;
use crate::error::{DeskError, Result};
use crate::hw_error::map_transport_error;
use crate::notify;
use crate::session::Session;

pub struct ConnectionManager {
    cfg: ConnectionCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl ConnectionManager {
    pub fn new(cfg: ConnectionCfg) -> Self {
        Self {
            cfg,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Use a custom clock for backoff sleeps (tests use `TestClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ConnectionCfg {
        &self.cfg
    }

    /// Scan for the peripheral at `address` (case-insensitive).
    pub fn discover<T: Transport>(&self, transport: &mut T, address: &str) -> Result<DeviceHandle> {
        tracing::info!(address, timeout_s = self.cfg.scan_timeout.as_secs(), "scanning");
        let found = transport
            .find(address, self.cfg.scan_timeout)
            .map_err(map_transport_error)?;
        found.ok_or_else(|| DeskError::DiscoveryTimeout {
            address: address.to_string(),
            timeout_sec: self.cfg.scan_timeout.as_secs(),
        })
    }

    /// Everything that advertised during one scan window.
    pub fn scan_all<T: Transport>(&self, transport: &mut T) -> Result<Vec<DeviceHandle>> {
        let mut devices = transport
            .scan(self.cfg.scan_timeout)
            .map_err(map_transport_error)?;
        devices.sort_by(|a, b| a.address.cmp(&b.address));
        devices.dedup_by(|a, b| a.matches(&b.address));
        tracing::info!(count = devices.len(), "scan finished");
        Ok(devices)
    }

    /// Like [`discover`](Self::discover), but first consults the device cache.
    ///
    /// A cached entry is only used when its address matches `address`; a
    /// successful scan refreshes the cache. Cache write failures are logged.
    pub fn discover_cached<T: Transport>(
        &self,
        transport: &mut T,
        address: &str,
        cache: Option<&Path>,
    ) -> Result<DeviceHandle> {
        if let Some(path) = cache {
            match load_device_cache(path) {
                Some(hit) if hit.address.eq_ignore_ascii_case(address) => {
                    tracing::debug!(path = %path.display(), "using cached device");
                    let mut handle = DeviceHandle::new(hit.address);
                    handle.name = hit.name;
                    return Ok(handle);
                }
                Some(stale) => {
                    tracing::info!(
                        cached = %stale.address,
                        wanted = address,
                        "ignoring cache for another device"
                    );
                }
                None => {}
            }
        }
        let handle = self.discover(transport, address)?;
        if let Some(path) = cache {
            let entry = CachedDevice {
                address: handle.address.clone(),
                name: handle.name.clone(),
            };
            if let Err(e) = store_device_cache(path, &entry) {
                tracing::warn!(path = %path.display(), error = %e, "could not update device cache");
            }
        }
        Ok(handle)
    }

    /// Open a session, retrying up to `max_attempts` times with backoff.
    ///
    /// Each attempt gets a fresh connect timeout. On failure the transport is
    /// dropped and `ConnectionFailure` carries the last cause. A budget of 0
    /// fails without touching the transport.
    pub fn connect<T: Transport>(
        &self,
        mut transport: T,
        device: &DeviceHandle,
        max_attempts: u32,
    ) -> Result<Session<T>> {
        let mut last_cause = String::from("no connect attempts allowed");
        for attempt in 1..=max_attempts {
            let wait = self.cfg.backoff_before(attempt);
            if !wait.is_zero() {
                tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "backing off");
                self.clock.sleep(wait);
            }
            match transport.connect(device, self.cfg.connect_timeout) {
                Ok(()) => {
                    tracing::info!(address = %device.address, attempt, "connected");
                    return Ok(Session::open(transport, device.clone(), self.cfg.io_timeout));
                }
                Err(e) => {
                    let cause = map_transport_error(e).to_string();
                    tracing::warn!(
                        address = %device.address,
                        attempt,
                        max_attempts,
                        %cause,
                        "connect failed"
                    );
                    last_cause = cause;
                }
            }
        }
        Err(DeskError::ConnectionFailure {
            attempts: max_attempts,
            cause: last_cause,
        })
    }

    /// Tear a session down. Safe to call more than once.
    pub fn disconnect<T: Transport>(&self, session: &mut Session<T>) -> Result<()> {
        if let Err(e) = notify::unsubscribe(session, Characteristic::Height) {
            tracing::debug!(error = %e, "unsubscribe during disconnect failed");
        }
        let was_connected = session.is_connected();
        session.mark_disconnected();
        if !was_connected && !session.transport().is_connected() {
            return Ok(());
        }
        session
            .transport_mut()
            .disconnect()
            .map_err(map_transport_error)?;
        tracing::info!(address = %session.device().address, "disconnected");
        Ok(())
    }
}
