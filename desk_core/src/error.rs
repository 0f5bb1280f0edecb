use desk_traits::Characteristic;
use thiserror::Error;

use crate::codec::ProtocolDecodeError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeskError {
    #[error("desk {address} was not advertising within {timeout_sec}s")]
    DiscoveryTimeout { address: String, timeout_sec: u64 },
    #[error("connection failed after {attempts} attempt(s): {cause}")]
    ConnectionFailure { attempts: u32, cause: String },
    #[error(transparent)]
    ProtocolDecode(#[from] ProtocolDecodeError),
    #[error("write to {characteristic:?} failed: {cause}")]
    ProtocolWrite {
        characteristic: Characteristic,
        cause: String,
    },
    #[error("connection to the desk was lost")]
    ConnectionLost,
    #[error("settled at {actual_mm:.1} mm, target {target_mm:.1} mm")]
    HeightMismatchAfterSettle { target_mm: f32, actual_mm: f32 },
    #[error("target not reached after {attempts} attempt(s), last height {final_height_mm:.1} mm")]
    AttemptsExhausted { attempts: u32, final_height_mm: f32 },
    #[error("movement cancelled")]
    Cancelled,
    #[error("another movement is already in progress")]
    Busy,
    #[error("not connected")]
    NotConnected,
    #[error("target {0:.1} mm is outside the travel range [620, 1270] mm")]
    TargetOutOfRange(f32),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("operation timeout")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, DeskError>;
