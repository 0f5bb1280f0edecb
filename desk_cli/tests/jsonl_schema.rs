use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        "movement_timeout_attempts = 2\n[motion]\npoll_interval_ms = 1\n\
         [connection]\nconnect_attempts = 2\nbackoff_ms = 1\nbackoff_max_ms = 1\n{extra}"
    );
    let path = dir.path().join("desk.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad JSON line {l:?}: {e}")))
        .collect()
}

#[test]
fn move_emits_progress_then_result() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = Command::cargo_bin("deskctl")
        .unwrap()
        .args(["--json", "--config"])
        .arg(&cfg)
        .args(["move", "--position", "position_1"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let lines = json_lines(&out.stdout);
    let (result, progress) = lines.split_last().expect("at least one line");
    assert!(progress.iter().all(|v| v["event"] == "progress"));
    assert!(progress.iter().any(|v| v["status"] == "Done"));

    for key in [
        "timestamp",
        "command",
        "target_mm",
        "duration_ms",
        "status",
        "final_height_mm",
        "attempts_used",
        "abort_reason",
    ] {
        assert!(result.get(key).is_some(), "missing {key} in {result}");
    }
    assert_eq!(result["command"], "move");
    assert_eq!(result["status"], "reached");
    assert_eq!(result["target_mm"], 700.0);
    assert!(result["abort_reason"].is_null());
}

#[rstest]
#[case("[simulation]\nadvertising = false\n", "DiscoveryTimeout", 2)]
#[case("[simulation]\nstall_short_mm = 50\n", "AttemptsExhausted", 4)]
fn failed_move_reports_reason(#[case] sim: &str, #[case] reason: &str, #[case] code: i32) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, sim);
    let out = Command::cargo_bin("deskctl")
        .unwrap()
        .args(["--json", "--config"])
        .arg(&cfg)
        .args(["move", "--height", "1150"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(code));

    // The result line is the only non-progress line; no separate error line.
    let lines = json_lines(&out.stdout);
    let outcome: Vec<_> = lines.iter().filter(|v| v["event"] != "progress").collect();
    assert_eq!(outcome.len(), 1, "{lines:?}");
    assert_eq!(outcome[0]["command"], "move");
    assert_eq!(outcome[0]["abort_reason"], reason);
}

#[test]
fn errors_before_a_move_are_one_json_line() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[simulation]\nadvertising = false\n");
    let out = Command::cargo_bin("deskctl")
        .unwrap()
        .args(["--json", "--config"])
        .arg(&cfg)
        .arg("height")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));

    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1, "{lines:?}");
    assert_eq!(lines[0]["event"], "error");
    assert_eq!(lines[0]["reason"], "DiscoveryTimeout");
    assert_eq!(lines[0]["exit_code"], 2);
}

#[test]
fn height_and_scan_are_json() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = Command::cargo_bin("deskctl")
        .unwrap()
        .args(["--json", "--config"])
        .arg(&cfg)
        .arg("height")
        .output()
        .unwrap();
    let lines = json_lines(&out.stdout);
    assert_eq!(lines[0]["height_mm"], 720.0);

    let out = Command::cargo_bin("deskctl")
        .unwrap()
        .args(["--json", "--config"])
        .arg(&cfg)
        .arg("scan")
        .output()
        .unwrap();
    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["address"], "FD:46:77:A9:30:CA");
    assert_eq!(lines[0]["name"], "Desk 4711");
}
