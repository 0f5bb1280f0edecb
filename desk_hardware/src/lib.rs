//! Transport backends for the desk controller.
//!
//! - [`SimulatedDesk`]: in-memory peripheral with a simple actuator model
//!   and fault injection, always available.
//! - [`ble::BleTransport`]: real BLE central via btleplug (`ble` feature).
#[cfg(feature = "ble")]
pub mod ble;
pub mod error;
pub mod sim;

pub use error::HwError;
pub use sim::{SimLog, SimSettings, SimulatedDesk};
