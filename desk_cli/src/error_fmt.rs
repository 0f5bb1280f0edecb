//! Human-readable error descriptions and structured JSON error formatting.

use desk_core::DeskError;

use crate::commands::abort_reason_name;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(de) = err.downcast_ref::<DeskError>() {
        return match de {
            DeskError::DiscoveryTimeout { address, timeout_sec } => format!(
                "What happened: Desk {address} did not show up within {timeout_sec}s.\nLikely causes: Desk is powered off, out of range, or paired to another host; wrong mac_address.\nHow to fix: Run `deskctl scan` to list nearby desks, check mac_address in the config, or raise scan_timeout_sec."
            ),
            DeskError::ConnectionFailure { attempts, cause } => format!(
                "What happened: Could not connect after {attempts} attempt(s) ({cause}).\nLikely causes: Another device holds the connection, or the adapter is busy.\nHow to fix: Disconnect other controllers (phone app), check adapter_name, or raise [connection].connect_attempts."
            ),
            DeskError::ConnectionLost | DeskError::NotConnected => {
                "What happened: The connection to the desk dropped.\nLikely causes: Desk moved out of range or lost power mid-command.\nHow to fix: Move closer to the desk and run the command again.".to_string()
            }
            DeskError::AttemptsExhausted { attempts, final_height_mm } => format!(
                "What happened: Desk stopped at {final_height_mm:.1} mm and never settled on the target ({attempts} attempt(s)).\nLikely causes: Obstruction, load limit, or a tolerance tighter than the actuator can hold.\nHow to fix: Clear the path, raise height_tolerance_mm, or increase movement_timeout_attempts."
            ),
            DeskError::Cancelled => {
                "What happened: Movement was cancelled.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Nothing to fix; the desk was told to stop.".to_string()
            }
            DeskError::TargetOutOfRange(mm) => format!(
                "What happened: Target {mm:.1} mm is outside what the desk can reach.\nLikely causes: Typo in --height or a preset outside 620..=1270 mm.\nHow to fix: Pick a height between 620 and 1270 mm."
            ),
            DeskError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Unknown preset name or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        let cause = err.root_cause();
        return format!(
            "What happened: Configuration is invalid ({cause}).\nLikely causes: Out-of-range values or a TOML syntax error.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("bluetooth adapter") {
        return format!(
            "What happened: {msg}.\nLikely causes: Bluetooth is off, the adapter name is wrong, or permissions are missing.\nHow to fix: Check adapter_name, `bluetoothctl power on`, and group membership (bluetooth)."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 discovery, 3 connection, 4 exhausted, 5 cancelled, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<DeskError>() {
        Some(DeskError::DiscoveryTimeout { .. }) => 2,
        Some(
            DeskError::ConnectionFailure { .. }
            | DeskError::ConnectionLost
            | DeskError::NotConnected,
        ) => 3,
        Some(DeskError::AttemptsExhausted { .. }) => 4,
        Some(DeskError::Cancelled) => 5,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = err
        .downcast_ref::<DeskError>()
        .map(abort_reason_name)
        .unwrap_or("Error");
    json!({
        "event": "error",
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
