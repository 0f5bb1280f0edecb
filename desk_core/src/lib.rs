#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Desk control core (transport-agnostic).
//!
//! Everything here talks to the peripheral through `desk_traits::Transport`,
//! so the same logic drives the BLE backend and the simulator.
//!
//! ## Architecture
//!
//! - **Codec**: bit-exact command, set-point and telemetry encoding (`codec`)
//! - **Connection**: discovery, bounded connect retries, teardown (`connection`)
//! - **Notifications**: telemetry subscription and handler traits (`notify`)
//! - **Motion**: wake/stop/stream/settle retry loop with guaranteed cleanup (`controller`)
//! - **Runner**: one-call orchestration of a whole run (`runner`)
//!
//! Heights are millimetres (`f32`) everywhere above the codec; the wire uses
//! tenths of a millimetre above `BASE_HEIGHT_MM`.

pub mod codec;
pub mod config;
pub mod connection;
pub mod controller;
mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod notify;
pub mod runner;
pub mod session;

pub use codec::{BASE_HEIGHT_MM, MAX_HEIGHT_MM, TelemetrySample};
pub use config::{ConnectionCfg, DeskCfg, MotionCfg};
pub use connection::ConnectionManager;
pub use controller::{
    CancelToken, Direction, MotionController, MotionState, MovementOutcome, MovementStatus,
    SharedDesk,
};
pub use error::{DeskError, Result};
pub use notify::{ProgressReporter, StatusForwarder, TelemetryHandler};
pub use runner::{run_to_position, run_with_session};
pub use session::{Session, Telemetry};
