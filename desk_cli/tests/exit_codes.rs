//! Failure classes map to distinct process exit codes.
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

const FAST: &str = r#"
movement_timeout_attempts = 2

[motion]
poll_interval_ms = 1

[connection]
connect_attempts = 3
backoff_ms = 1
backoff_max_ms = 1
"#;

#[rstest]
#[case::silent_desk("[simulation]\nadvertising = false\n", 2, "did not show up")]
#[case::refused_connections("[simulation]\nfail_connects = 3\n", 3, "after 3 attempt(s)")]
#[case::stalled_actuator("[simulation]\nstall_short_mm = 50\n", 4, "never settled")]
fn failures_exit_with_their_code(#[case] sim: &str, #[case] code: i32, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("desk.toml");
    fs::write(&cfg, format!("{FAST}\n{sim}")).unwrap();

    Command::cargo_bin("deskctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["move", "--position", "position_3"])
        .env_remove("RUST_LOG")
        .assert()
        .code(code)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn connection_recovers_within_budget() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("desk.toml");
    fs::write(&cfg, format!("{FAST}\n[simulation]\nfail_connects = 2\n")).unwrap();

    Command::cargo_bin("deskctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("height")
        .assert()
        .success();
}
