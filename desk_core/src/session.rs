//! One live link to a desk.
//!
//! A `Session` exclusively owns its transport. Telemetry pushed by the
//! notification sink lands in a shared `Telemetry` cell; the motion loop
//! only ever reads the most recent sample.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use desk_traits::{Characteristic, DeviceHandle, Transport};

use crate::codec::{self, BASE_HEIGHT_MM, TelemetrySample};
use crate::error::{DeskError, Result};
use crate::hw_error::map_transport_error;

/// Latest known actuator state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub height_mm: f32,
    pub speed: i16,
    /// Samples recorded since the session was opened.
    pub samples: u64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            height_mm: BASE_HEIGHT_MM,
            speed: 0,
            samples: 0,
        }
    }
}

impl Telemetry {
    pub fn record(&mut self, sample: &TelemetrySample) {
        self.height_mm = sample.height_mm;
        self.speed = sample.speed;
        self.samples = self.samples.saturating_add(1);
    }
}

pub(crate) type SharedTelemetry = Arc<Mutex<Telemetry>>;

pub(crate) fn lock_telemetry(cell: &SharedTelemetry) -> MutexGuard<'_, Telemetry> {
    // A panicking handler must not take telemetry down with it.
    cell.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Session<T: Transport> {
    transport: T,
    device: DeviceHandle,
    connected: bool,
    subscribed: bool,
    telemetry: SharedTelemetry,
    io_timeout: Duration,
}

impl<T: Transport> Session<T> {
    pub(crate) fn open(transport: T, device: DeviceHandle, io_timeout: Duration) -> Self {
        Self {
            transport,
            device,
            connected: true,
            subscribed: false,
            telemetry: Arc::new(Mutex::new(Telemetry::default())),
            io_timeout,
        }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Copy of the latest telemetry.
    pub fn telemetry(&self) -> Telemetry {
        *lock_telemetry(&self.telemetry)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn telemetry_cell(&self) -> SharedTelemetry {
        Arc::clone(&self.telemetry)
    }

    pub(crate) fn set_subscribed(&mut self, on: bool) {
        self.subscribed = on;
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
        self.subscribed = false;
    }

    /// Write one payload with the session's I/O timeout.
    ///
    /// Errors: `NotConnected` before touching the transport when the link is
    /// known to be down, `ConnectionLost` when the write revealed a dropped
    /// link, otherwise `ProtocolWrite`.
    pub fn write(&mut self, characteristic: Characteristic, payload: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(DeskError::NotConnected);
        }
        let Err(e) = self
            .transport
            .write(characteristic, payload, self.io_timeout)
        else {
            return Ok(());
        };
        let mapped = map_transport_error(e);
        if mapped == DeskError::ConnectionLost || !self.transport.is_connected() {
            tracing::warn!(
                address = %self.device.address,
                ?characteristic,
                "link dropped during write"
            );
            self.mark_disconnected();
            return Err(DeskError::ConnectionLost);
        }
        Err(DeskError::ProtocolWrite {
            characteristic,
            cause: mapped.to_string(),
        })
    }

    /// One-shot read of the height characteristic. The result is also
    /// recorded as the latest telemetry.
    pub fn read_height(&mut self) -> Result<TelemetrySample> {
        if !self.connected {
            return Err(DeskError::NotConnected);
        }
        let bytes = self
            .transport
            .read(Characteristic::Height, self.io_timeout)
            .map_err(map_transport_error)?;
        let sample = codec::decode_telemetry(&bytes)?;
        lock_telemetry(&self.telemetry).record(&sample);
        Ok(sample)
    }
}
