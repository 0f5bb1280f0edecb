//! `deskctl`: drive a BLE standing desk to presets or absolute heights.

mod cli;
mod commands;
mod error_fmt;

use std::path::Path;

use clap::Parser;
use desk_config::{Config, Logging};
use desk_core::Direction;
use eyre::{Result, WrapErr};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    let _ = JSON_MODE.set(json);

    if let Err(e) = run(cli) {
        if *JSON_MODE.get().unwrap_or(&false) {
            // A failed move already carried its abort_reason on the result line.
            if !commands::result_printed(&e) {
                println!("{}", format_error_json(&e));
            }
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> Result<()> {
    let _ = color_eyre::install();

    let cfg = desk_config::load_or_default(&cli.config)?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", cli.config.display()))?;

    // Dropped at the end of `run` so buffered file lines are flushed.
    let _log_guard = init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), backend = commands::BACKEND, "starting");

    dispatch(&cfg, cli.json, cli.cmd)
}

fn dispatch(cfg: &Config, json: bool, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Move { position, height } => {
            commands::run_move(cfg, json, position.as_deref(), height)
        }
        Commands::Up => commands::run_nudge(cfg, json, Direction::Up),
        Commands::Down => commands::run_nudge(cfg, json, Direction::Down),
        Commands::Stop => commands::run_stop(cfg, json),
        Commands::Height => commands::run_height(cfg, json),
        Commands::Scan => commands::run_scan(cfg, json),
        Commands::SelfCheck => commands::self_check(cfg, json),
    }
}

/// Console logs go to stderr so stdout stays parseable; an optional JSON
/// file sink is added when `[logging].file` is set.
///
/// Level precedence: `RUST_LOG`, then `--log-level`, then `[logging].level`.
fn init_tracing(
    json: bool,
    cli_level: Option<&str>,
    logging: &Logging,
) -> Result<Option<WorkerGuard>> {
    let level = cli_level
        .or(logging.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let mut guard = None;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("log file path {file:?} has no file name"))?;
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("create log directory {}", dir.display()))?;

        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
    Ok(guard)
}
