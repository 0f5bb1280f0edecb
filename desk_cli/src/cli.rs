//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "deskctl", version, about = "Standing desk controller")]
pub struct Cli {
    /// Path to config TOML; a missing file means built-in defaults
    #[arg(long, value_name = "FILE", default_value = "etc/desk_config.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the desk to a preset or an absolute height
    Move {
        /// Preset name from [positions], e.g. position_2
        #[arg(
            long,
            value_name = "NAME",
            conflicts_with = "height",
            required_unless_present = "height"
        )]
        position: Option<String>,
        /// Absolute target in millimetres (620..=1270)
        #[arg(long, value_name = "MM")]
        height: Option<f32>,
    },
    /// Jog up by one step
    Up,
    /// Jog down by one step
    Down,
    /// Halt any movement
    Stop,
    /// Read the current height
    Height,
    /// List advertising peripherals
    Scan,
    /// Validate config and open the backend without moving anything
    SelfCheck,
}
