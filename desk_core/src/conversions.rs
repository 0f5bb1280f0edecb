//! `From` implementations bridging `desk_config` types to `desk_core` types.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ConnectionCfg, DeskCfg, MotionCfg};

impl From<&desk_config::Config> for MotionCfg {
    fn from(c: &desk_config::Config) -> Self {
        Self {
            height_tolerance_mm: c.height_tolerance_mm,
            attempts: c.movement_timeout_attempts,
            poll_interval: Duration::from_millis(c.motion.poll_interval_ms),
            max_stream_ticks: c.motion.max_stream_ticks,
        }
    }
}

impl From<&desk_config::Config> for ConnectionCfg {
    fn from(c: &desk_config::Config) -> Self {
        Self {
            scan_timeout: Duration::from_secs(c.scan_timeout_sec),
            connect_timeout: Duration::from_secs(c.connection_timeout_sec),
            attempts: c.connection.connect_attempts,
            backoff: Duration::from_millis(c.connection.backoff_ms),
            backoff_max: Duration::from_millis(c.connection.backoff_max_ms),
            io_timeout: Duration::from_millis(c.motion.write_timeout_ms),
        }
    }
}

impl From<&desk_config::Config> for DeskCfg {
    fn from(c: &desk_config::Config) -> Self {
        Self {
            mac_address: c.mac_address.clone(),
            adapter_name: c.adapter_name.clone(),
            positions: c.positions.clone(),
            motion: MotionCfg::from(c),
            connection: ConnectionCfg::from(c),
            device_cache: c.cache.device_file.as_ref().map(PathBuf::from),
        }
    }
}
