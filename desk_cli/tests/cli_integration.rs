use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast timings so the simulated desk settles in milliseconds.
const FAST: &str = r#"
[motion]
poll_interval_ms = 1

[connection]
connect_attempts = 3
backoff_ms = 1
backoff_max_ms = 1
"#;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("desk.toml");
    fs::write(&path, format!("{FAST}\n{extra}")).unwrap();
    path
}

fn deskctl(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("deskctl").unwrap();
    cmd.arg("--config").arg(cfg).env_remove("RUST_LOG");
    cmd
}

#[rstest]
#[case(&["move", "--position", "position_3"], 0, "Movement reached", "stdout")]
#[case(&["move", "--height", "1000"], 0, "1000.0 mm", "stdout")]
#[case(&["move", "--position", "position_2"], 0, "Done", "stdout")]
#[case(&["move"], 2, "required", "stderr")]
#[case(&["move", "--position", "position_1", "--height", "800"], 2, "cannot be used", "stderr")]
#[case(&["move", "--position", "sofa"], 1, "unknown position", "stderr")]
#[case(&["move", "--height", "1500"], 1, "outside what the desk can reach", "stderr")]
#[case(&["height"], 0, "Height: 720.0 mm", "stdout")]
#[case(&["up"], 0, "Nudged up", "stdout")]
#[case(&["down"], 0, "Nudged down", "stdout")]
#[case(&["stop"], 0, "Stopped", "stdout")]
#[case(&["scan"], 0, "FD:46:77:A9:30:CA", "stdout")]
#[case(&["self-check"], 0, "OK: backend=simulated", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let assert = deskctl(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("deskctl")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("self-check"));
}

#[test]
fn missing_config_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let absent = dir.path().join("nope.toml");
    deskctl(&absent)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("position_1=700"));
}

#[test]
fn out_of_band_preset_is_rejected_before_connecting() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[positions]\nposition_1 = 100\n");
    deskctl(&cfg)
        .arg("height")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("positions.position_1"));
}

#[test]
fn malformed_toml_names_the_file() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[motion\n");
    deskctl(&cfg)
        .arg("height")
        .assert()
        .failure()
        .stderr(predicate::str::contains("desk.toml"));
}

#[test]
fn custom_preset_is_addressable_by_name() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[positions]\nstanding = 1100\n");
    deskctl(&cfg)
        .args(["move", "--position", "standing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1100.0 mm"));
}

#[test]
fn log_file_receives_json_lines() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("logs").join("desk.log");
    let extra = format!("[logging]\nfile = {:?}\nlevel = \"debug\"\n", log.display().to_string());
    let cfg = write_config(&dir, &extra);
    deskctl(&cfg)
        .args(["move", "--height", "800"])
        .assert()
        .success();

    let text = fs::read_to_string(&log).unwrap();
    let first = text.lines().next().expect("log file has lines");
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(v.get("level").is_some(), "{first}");
}
