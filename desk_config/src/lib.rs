#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the desk controller.
//!
//! - `Config` and its tables are deserialized from TOML and validated.
//! - Every key is optional; absent keys (or an absent file) fall back to the
//!   documented defaults.
//! - `cache` persists the last discovered peripheral between runs.
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::BTreeMap;
use std::path::Path;

pub mod cache;

pub use cache::{CachedDevice, load_device_cache, store_device_cache};

/// Lowest height the actuator can report, in millimetres.
pub const BASE_HEIGHT_MM: f32 = 620.0;
/// Highest height the actuator can reach, in millimetres.
pub const MAX_HEIGHT_MM: f32 = 1270.0;

pub const DEFAULT_MAC_ADDRESS: &str = "FD:46:77:A9:30:CA";
pub const DEFAULT_ADAPTER: &str = "hci0";

/// Built-in presets: sitting, standing, tall standing.
pub fn default_positions() -> BTreeMap<String, f32> {
    BTreeMap::from([
        ("position_1".to_string(), BASE_HEIGHT_MM + 80.0),
        ("position_2".to_string(), BASE_HEIGHT_MM + 430.0),
        ("position_3".to_string(), BASE_HEIGHT_MM + 530.0),
    ])
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Delay between successive set-point writes while streaming.
    pub poll_interval_ms: u64,
    /// Timeout applied to each individual GATT write/read.
    pub write_timeout_ms: u64,
    /// Ceiling on poll ticks within one attempt when speed never reads zero.
    pub max_stream_ticks: u32,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            write_timeout_ms: 2000,
            max_stream_ticks: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConnectionCfg {
    /// Connect attempts before giving up
    pub connect_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub backoff_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ConnectionCfg {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            backoff_ms: 500,
            backoff_max_ms: 4000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CacheCfg {
    /// Where to remember the last discovered desk; disabled when absent.
    pub device_file: Option<String>,
}

/// Parameters for the simulated backend used when no BLE stack is compiled in.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    pub start_height_mm: f32,
    pub step_mm: f32,
    pub stall_short_mm: f32,
    pub fail_connects: u32,
    pub advertising: bool,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            start_height_mm: BASE_HEIGHT_MM + 100.0,
            step_mm: 20.0,
            stall_short_mm: 0.0,
            fail_connects: 0,
            advertising: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Peripheral identity
    pub mac_address: String,
    /// Local radio (BlueZ adapter name)
    pub adapter_name: String,
    /// Named presets in millimetres. Keys given in the file override the
    /// built-in ones; unnamed built-ins remain available.
    #[serde(deserialize_with = "de_positions")]
    pub positions: BTreeMap<String, f32>,
    /// Acceptance band around the target after the actuator settles
    pub height_tolerance_mm: f32,
    pub scan_timeout_sec: u64,
    pub connection_timeout_sec: u64,
    /// Full wake/stop/stream/settle cycles before giving up
    pub movement_timeout_attempts: u32,
    pub motion: MotionCfg,
    pub connection: ConnectionCfg,
    pub logging: Logging,
    pub cache: CacheCfg,
    pub simulation: SimulationCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mac_address: DEFAULT_MAC_ADDRESS.to_string(),
            adapter_name: DEFAULT_ADAPTER.to_string(),
            positions: default_positions(),
            height_tolerance_mm: 1.0,
            scan_timeout_sec: 5,
            connection_timeout_sec: 5,
            movement_timeout_attempts: 5,
            motion: MotionCfg::default(),
            connection: ConnectionCfg::default(),
            logging: Logging::default(),
            cache: CacheCfg::default(),
            simulation: SimulationCfg::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeightToml {
    Int(i64),
    Float(f32),
}

fn de_positions<'de, D>(deserializer: D) -> Result<BTreeMap<String, f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let given: BTreeMap<String, HeightToml> = BTreeMap::deserialize(deserializer)?;
    let mut out = default_positions();
    for (name, h) in given {
        let mm = match h {
            HeightToml::Int(v) => v as f32,
            HeightToml::Float(v) => v,
        };
        out.insert(name, mm);
    }
    Ok(out)
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file. A missing file yields the defaults.
pub fn load_or_default(path: &Path) -> eyre::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(text) => load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(eyre::eyre!("read config {:?}: {}", path, e)),
    }
}

impl Config {
    /// Height of a named preset, if configured.
    pub fn position(&self, name: &str) -> Option<f32> {
        self.positions.get(name).copied()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Identity
        if self.mac_address.trim().is_empty() {
            eyre::bail!("mac_address must not be empty");
        }
        if self.adapter_name.trim().is_empty() {
            eyre::bail!("adapter_name must not be empty");
        }

        // Positions
        for (name, mm) in &self.positions {
            if !mm.is_finite() || *mm < BASE_HEIGHT_MM || *mm > MAX_HEIGHT_MM {
                eyre::bail!(
                    "positions.{name} = {mm} is outside [{BASE_HEIGHT_MM}, {MAX_HEIGHT_MM}] mm"
                );
            }
        }

        // Tolerance and budgets
        if !(self.height_tolerance_mm.is_finite() && self.height_tolerance_mm > 0.0) {
            eyre::bail!("height_tolerance_mm must be > 0");
        }
        if self.height_tolerance_mm > 100.0 {
            eyre::bail!("height_tolerance_mm is unreasonably large (>100mm)");
        }
        if self.scan_timeout_sec == 0 {
            eyre::bail!("scan_timeout_sec must be >= 1");
        }
        if self.connection_timeout_sec == 0 {
            eyre::bail!("connection_timeout_sec must be >= 1");
        }
        if self.movement_timeout_attempts == 0 {
            eyre::bail!("movement_timeout_attempts must be >= 1");
        }

        // Motion
        if self.motion.poll_interval_ms == 0 {
            eyre::bail!("motion.poll_interval_ms must be >= 1");
        }
        if self.motion.write_timeout_ms == 0 {
            eyre::bail!("motion.write_timeout_ms must be >= 1");
        }
        if self.motion.max_stream_ticks == 0 {
            eyre::bail!("motion.max_stream_ticks must be >= 1");
        }

        // Connection
        if self.connection.connect_attempts == 0 {
            eyre::bail!("connection.connect_attempts must be >= 1");
        }
        if self.connection.backoff_max_ms < self.connection.backoff_ms {
            eyre::bail!("connection.backoff_max_ms must be >= connection.backoff_ms");
        }

        // Simulation
        if !(self.simulation.step_mm.is_finite() && self.simulation.step_mm > 0.0) {
            eyre::bail!("simulation.step_mm must be > 0");
        }
        if self.simulation.stall_short_mm < 0.0 {
            eyre::bail!("simulation.stall_short_mm must be >= 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let cfg = load_toml("").expect("parse");
        assert_eq!(cfg.mac_address, DEFAULT_MAC_ADDRESS);
        assert_eq!(cfg.adapter_name, "hci0");
        assert_eq!(cfg.movement_timeout_attempts, 5);
        assert_eq!(cfg.position("position_3"), Some(1150.0));
        assert_eq!(cfg.motion.poll_interval_ms, 200);
        cfg.validate().expect("defaults validate");
    }

    #[test]
    fn positions_merge_over_defaults() {
        let cfg = load_toml(
            r#"
[positions]
position_2 = 1000
position_4 = 812.5
"#,
        )
        .expect("parse");
        assert_eq!(cfg.position("position_1"), Some(700.0));
        assert_eq!(cfg.position("position_2"), Some(1000.0));
        assert_eq!(cfg.position("position_4"), Some(812.5));
    }
}
