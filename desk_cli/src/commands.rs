//! Subcommand execution: backend assembly, progress output and results.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Sender, unbounded};
use desk_config::Config;
use desk_core::{
    CancelToken, ConnectionManager, DeskCfg, DeskError, Direction, MovementOutcome,
    MovementStatus, ProgressReporter, run_to_position, run_with_session,
};
use desk_traits::{Clock, MonotonicClock, Transport};
use eyre::{Result, WrapErr};
use serde_json::json;

pub type BoxedTransport = Box<dyn Transport + Send>;

#[cfg(feature = "ble")]
pub const BACKEND: &str = "ble";
#[cfg(not(feature = "ble"))]
pub const BACKEND: &str = "simulated";

#[cfg(feature = "ble")]
pub fn open_transport(cfg: &Config) -> Result<BoxedTransport> {
    let t = desk_hardware::ble::BleTransport::new(&cfg.adapter_name)
        .wrap_err_with(|| format!("open bluetooth adapter {}", cfg.adapter_name))?
        .with_io_timeout(std::time::Duration::from_millis(cfg.motion.write_timeout_ms));
    Ok(Box::new(t))
}

#[cfg(not(feature = "ble"))]
pub fn open_transport(cfg: &Config) -> Result<BoxedTransport> {
    tracing::info!("no BLE backend compiled in; using the simulated desk");
    Ok(Box::new(desk_hardware::SimulatedDesk::new(sim_settings(cfg))))
}

/// Simulator parameters; the simulated desk answers at the configured address.
#[cfg_attr(feature = "ble", allow(dead_code))]
pub fn sim_settings(cfg: &Config) -> desk_hardware::SimSettings {
    let s = &cfg.simulation;
    desk_hardware::SimSettings {
        address: cfg.mac_address.clone(),
        start_height_mm: s.start_height_mm,
        step_mm: s.step_mm,
        stall_short_mm: s.stall_short_mm,
        fail_connects: s.fail_connects,
        advertising: s.advertising,
        ..Default::default()
    }
}

fn clock() -> Arc<dyn Clock + Send + Sync> {
    Arc::new(MonotonicClock::new())
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

enum Line {
    Status(String),
    Close,
}

/// Prints progress lines on its own thread so the notification context
/// never blocks on stdout.
struct ProgressPrinter {
    tx: Sender<Line>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressPrinter {
    fn spawn(json: bool) -> Self {
        let (tx, rx) = unbounded::<Line>();
        let handle = std::thread::spawn(move || {
            while let Ok(Line::Status(s)) = rx.recv() {
                if json {
                    println!("{}", json!({ "event": "progress", "status": s }));
                } else {
                    println!("{s}");
                }
            }
        });
        Self {
            tx,
            handle: Some(handle),
        }
    }

    fn reporter(&self) -> Arc<dyn ProgressReporter> {
        let tx = self.tx.clone();
        Arc::new(move |status: &str| {
            let _ = tx.send(Line::Status(status.to_string()));
        })
    }

    fn finish(mut self) {
        let _ = self.tx.send(Line::Close);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Context marking a failure whose result line is already on stdout.
#[derive(Debug)]
pub struct ResultPrinted;

impl std::fmt::Display for ResultPrinted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("movement result already reported")
    }
}

/// True when `--json` output for this error has already been written.
pub fn result_printed(err: &eyre::Report) -> bool {
    err.downcast_ref::<ResultPrinted>().is_some()
}

fn status_name(status: MovementStatus) -> &'static str {
    match status {
        MovementStatus::Reached => "reached",
        MovementStatus::Exhausted => "exhausted",
        MovementStatus::Cancelled => "cancelled",
    }
}

pub fn abort_reason_name(e: &DeskError) -> &'static str {
    match e {
        DeskError::DiscoveryTimeout { .. } => "DiscoveryTimeout",
        DeskError::ConnectionFailure { .. } => "ConnectionFailure",
        DeskError::ProtocolDecode(_) => "ProtocolDecode",
        DeskError::ProtocolWrite { .. } => "ProtocolWrite",
        DeskError::ConnectionLost => "ConnectionLost",
        DeskError::HeightMismatchAfterSettle { .. } => "HeightMismatchAfterSettle",
        DeskError::AttemptsExhausted { .. } => "AttemptsExhausted",
        DeskError::Cancelled => "Cancelled",
        DeskError::Busy => "Busy",
        DeskError::NotConnected => "NotConnected",
        DeskError::TargetOutOfRange(_) => "TargetOutOfRange",
        DeskError::Config(_) => "Config",
        DeskError::Timeout => "Timeout",
        DeskError::Transport(_) => "Transport",
    }
}

fn print_move_result(
    json: bool,
    target_mm: f32,
    started: Instant,
    outcome: Option<&MovementOutcome>,
    failure: Option<&DeskError>,
) {
    if json {
        let line = json!({
            "timestamp": unix_ms(),
            "command": "move",
            "target_mm": target_mm,
            "duration_ms": started.elapsed().as_millis() as u64,
            "status": outcome.map(|o| status_name(o.status)),
            "final_height_mm": outcome.map(|o| o.final_height_mm),
            "attempts_used": outcome.map(|o| o.attempts_used),
            "abort_reason": failure.map(abort_reason_name),
        });
        println!("{line}");
    } else if let Some(o) = outcome {
        println!(
            "Movement {}: {:.1} mm (target {:.1} mm) after {} attempt(s)",
            status_name(o.status),
            o.final_height_mm,
            target_mm,
            o.attempts_used
        );
    }
}

fn install_ctrlc(cancel: &CancelToken) {
    let token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; stopping the desk");
        token.cancel();
    }) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
}

fn resolve_target(cfg: &DeskCfg, position: Option<&str>, height: Option<f32>) -> Result<f32> {
    match (position, height) {
        (_, Some(mm)) => Ok(mm),
        (Some(name), None) => Ok(cfg.position(name)?),
        (None, None) => eyre::bail!("either --position or --height is required"),
    }
}

pub fn run_move(
    cfg: &Config,
    json: bool,
    position: Option<&str>,
    height: Option<f32>,
) -> Result<()> {
    let desk_cfg = DeskCfg::from(cfg);
    let target_mm = resolve_target(&desk_cfg, position, height)?;
    let transport = open_transport(cfg)?;

    let cancel = CancelToken::new();
    install_ctrlc(&cancel);
    let printer = ProgressPrinter::spawn(json);
    let started = Instant::now();
    tracing::info!(target_mm, backend = BACKEND, "move start");

    let result = run_to_position(
        transport,
        &desk_cfg,
        clock(),
        target_mm,
        printer.reporter(),
        &cancel,
    );
    printer.finish();

    match result {
        Ok(outcome) => {
            let failure = outcome.into_result().err();
            print_move_result(json, target_mm, started, Some(&outcome), failure.as_ref());
            match failure {
                Some(e) => Err(eyre::Report::new(e).wrap_err(ResultPrinted)),
                None => Ok(()),
            }
        }
        Err(e) => {
            print_move_result(json, target_mm, started, None, Some(&e));
            Err(eyre::Report::new(e).wrap_err(ResultPrinted))
        }
    }
}

pub fn run_nudge(cfg: &Config, json: bool, direction: Direction) -> Result<()> {
    let transport = open_transport(cfg)?;
    run_with_session(transport, &DeskCfg::from(cfg), clock(), |controller, session| {
        controller.nudge(session, direction)
    })?;
    let name = match direction {
        Direction::Up => "up",
        Direction::Down => "down",
    };
    if json {
        println!("{}", json!({ "command": name, "ok": true }));
    } else {
        println!("Nudged {name}");
    }
    Ok(())
}

pub fn run_stop(cfg: &Config, json: bool) -> Result<()> {
    let transport = open_transport(cfg)?;
    run_with_session(transport, &DeskCfg::from(cfg), clock(), |controller, session| {
        controller.stop(session)
    })?;
    if json {
        println!("{}", json!({ "command": "stop", "ok": true }));
    } else {
        println!("Stopped");
    }
    Ok(())
}

pub fn run_height(cfg: &Config, json: bool) -> Result<()> {
    let transport = open_transport(cfg)?;
    let sample = run_with_session(transport, &DeskCfg::from(cfg), clock(), |controller, session| {
        controller.read_height(session)
    })?;
    if json {
        println!(
            "{}",
            json!({ "command": "height", "height_mm": sample.height_mm, "speed": sample.speed })
        );
    } else {
        println!("Height: {:.1} mm", sample.height_mm);
    }
    Ok(())
}

pub fn run_scan(cfg: &Config, json: bool) -> Result<()> {
    let mut transport = open_transport(cfg)?;
    let manager = ConnectionManager::new(DeskCfg::from(cfg).connection);
    let devices = manager.scan_all(&mut transport)?;
    for d in &devices {
        if json {
            println!("{}", json!({ "address": d.address, "name": d.name }));
        } else {
            println!("{}\t{}", d.address, d.name.as_deref().unwrap_or("<unnamed>"));
        }
    }
    if !json && devices.is_empty() {
        println!("No devices found");
    }
    Ok(())
}

pub fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let _transport = open_transport(cfg).wrap_err("backend unavailable")?;
    let positions: Vec<String> = cfg
        .positions
        .iter()
        .map(|(name, mm)| format!("{name}={mm:.0}"))
        .collect();
    if json {
        let line = json!({
            "ok": true,
            "backend": BACKEND,
            "address": cfg.mac_address,
            "positions": cfg.positions,
        });
        println!("{line}");
    } else {
        println!(
            "OK: backend={BACKEND} desk={} positions: {}",
            cfg.mac_address,
            positions.join(", ")
        );
    }
    Ok(())
}
