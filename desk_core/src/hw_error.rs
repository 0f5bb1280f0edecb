//! Maps `Box<dyn Error>` from the transport seam to typed `DeskError`.
//!
//! `desk_traits::Transport` returns boxed errors so backends stay free to use
//! their own types; this module converts them, with a feature-gated path for
//! precise `desk_hardware::HwError` downcasting.

use desk_traits::TransportError;

use crate::error::DeskError;

/// Map a trait-boundary error to a typed `DeskError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DeskError {
    #[cfg(feature = "hardware-errors")]
    {
        use desk_hardware::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => DeskError::Timeout,
                HwError::Disconnected | HwError::NotConnected => DeskError::ConnectionLost,
                other => DeskError::Transport(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        DeskError::Timeout
    } else if lower.contains("disconnected") || lower.contains("not connected") {
        DeskError::ConnectionLost
    } else {
        DeskError::Transport(s)
    }
}

pub fn map_transport_error(e: TransportError) -> DeskError {
    map_hw_error(e.as_ref())
}
