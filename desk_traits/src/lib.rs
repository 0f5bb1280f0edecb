//! Hardware seams shared by the desk workspace.
//!
//! `Transport` is the only way the control core talks to a BLE peripheral.
//! Errors cross this boundary as boxed trait objects; `desk_core::hw_error`
//! maps them to typed errors.
pub mod clock;

pub use clock::{Clock, MonotonicClock, TestClock};

use std::time::Duration;

/// Error type returned across the transport boundary.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Callback receiving raw notification payloads.
///
/// Invoked on the transport's own delivery context; must not block.
pub type NotifySink = Box<dyn Fn(&[u8]) + Send + Sync>;

/// GATT characteristics exposed by the desk's control box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Height/speed telemetry (notify, read).
    Height,
    /// One-shot movement opcodes (write).
    Command,
    /// Live position set-point (write).
    ReferenceInput,
}

impl Characteristic {
    pub const fn uuid(self) -> &'static str {
        match self {
            Characteristic::Height => "99fa0021-338a-1024-8a49-009c0215f78a",
            Characteristic::Command => "99fa0002-338a-1024-8a49-009c0215f78a",
            Characteristic::ReferenceInput => "99fa0031-338a-1024-8a49-009c0215f78a",
        }
    }
}

/// Result of discovery: identifies one peripheral by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub address: String,
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// BLE addresses compare case-insensitively (`fd:46:..` == `FD:46:..`).
    pub fn matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

/// Blocking BLE central abstraction.
///
/// Every network operation takes its own timeout so a hung stack cannot stall
/// the caller indefinitely.
pub trait Transport {
    /// List every peripheral advertising within `timeout`.
    fn scan(&mut self, timeout: Duration) -> Result<Vec<DeviceHandle>, TransportError>;

    /// Look for one peripheral by address; `Ok(None)` when it did not show up.
    fn find(
        &mut self,
        address: &str,
        timeout: Duration,
    ) -> Result<Option<DeviceHandle>, TransportError> {
        Ok(self
            .scan(timeout)?
            .into_iter()
            .find(|d| d.matches(address)))
    }

    fn connect(&mut self, device: &DeviceHandle, timeout: Duration) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
    fn disconnect(&mut self) -> Result<(), TransportError>;

    fn write(
        &mut self,
        characteristic: Characteristic,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn read(
        &mut self,
        characteristic: Characteristic,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    fn start_notify(
        &mut self,
        characteristic: Characteristic,
        sink: NotifySink,
    ) -> Result<(), TransportError>;

    fn stop_notify(&mut self, characteristic: Characteristic) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn scan(&mut self, timeout: Duration) -> Result<Vec<DeviceHandle>, TransportError> {
        (**self).scan(timeout)
    }
    fn find(
        &mut self,
        address: &str,
        timeout: Duration,
    ) -> Result<Option<DeviceHandle>, TransportError> {
        (**self).find(address, timeout)
    }
    fn connect(&mut self, device: &DeviceHandle, timeout: Duration) -> Result<(), TransportError> {
        (**self).connect(device, timeout)
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn disconnect(&mut self) -> Result<(), TransportError> {
        (**self).disconnect()
    }
    fn write(
        &mut self,
        characteristic: Characteristic,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        (**self).write(characteristic, payload, timeout)
    }
    fn read(
        &mut self,
        characteristic: Characteristic,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read(characteristic, timeout)
    }
    fn start_notify(
        &mut self,
        characteristic: Characteristic,
        sink: NotifySink,
    ) -> Result<(), TransportError> {
        (**self).start_notify(characteristic, sink)
    }
    fn stop_notify(&mut self, characteristic: Characteristic) -> Result<(), TransportError> {
        (**self).stop_notify(characteristic)
    }
}
