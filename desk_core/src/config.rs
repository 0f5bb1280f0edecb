//! Runtime configuration, already converted to the units the core works in.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DeskError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct MotionCfg {
    pub height_tolerance_mm: f32,
    /// Full wake/stop/stream/settle cycles per movement.
    pub attempts: u32,
    pub poll_interval: Duration,
    pub max_stream_ticks: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionCfg {
    pub scan_timeout: Duration,
    /// Per connect attempt.
    pub connect_timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
    pub backoff_max: Duration,
    /// Per write and per read.
    pub io_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeskCfg {
    pub mac_address: String,
    pub adapter_name: String,
    pub positions: BTreeMap<String, f32>,
    pub motion: MotionCfg,
    pub connection: ConnectionCfg,
    pub device_cache: Option<PathBuf>,
}

impl Default for DeskCfg {
    fn default() -> Self {
        Self::from(&desk_config::Config::default())
    }
}

impl DeskCfg {
    /// Height of a named preset, or `Config` error naming the known presets.
    pub fn position(&self, name: &str) -> Result<f32> {
        self.positions.get(name).copied().ok_or_else(|| {
            let known: Vec<&str> = self.positions.keys().map(String::as_str).collect();
            DeskError::Config(format!(
                "unknown position {name:?} (known: {})",
                known.join(", ")
            ))
        })
    }
}

impl ConnectionCfg {
    /// Delay before connect attempt `attempt` (1-based): none before the
    /// first, then `backoff` doubling per retry up to `backoff_max`.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let shift = (attempt - 2).min(16);
        self.backoff
            .saturating_mul(1u32 << shift)
            .min(self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 0)]
    #[case(2, 500)]
    #[case(3, 1000)]
    #[case(4, 2000)]
    #[case(5, 4000)]
    #[case(6, 4000)]
    #[case(40, 4000)]
    fn backoff_doubles_then_caps(#[case] attempt: u32, #[case] ms: u64) {
        let cfg = DeskCfg::default();
        assert_eq!(
            cfg.connection.backoff_before(attempt),
            Duration::from_millis(ms)
        );
    }

    #[test]
    fn unknown_position_lists_presets() {
        let cfg = DeskCfg::default();
        assert_eq!(cfg.position("position_2").unwrap(), 1050.0);
        let msg = cfg.position("sofa").unwrap_err().to_string();
        assert!(msg.contains("position_1, position_2, position_3"), "{msg}");
    }
}
