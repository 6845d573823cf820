//! E2E Test: the `groundwork` binary
//!
//! Runs the built executable against temporary roots and checks the exit
//! status and output the supervisor relies on.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const ENV_KEYS: &[&str] = &[
    "GROUNDWORK_DATA_DIR",
    "GROUNDWORK_LOG_DIR",
    "GROUNDWORK_STARTUP_TIMEOUT_SECS",
    "GROUNDWORK_STORE_FILE",
    "GROUNDWORK_MIGRATIONS_DIR",
    "RUST_LOG",
];

/// Run `groundwork` inside `dir` with `data/` and `logs/` as its roots
fn groundwork(dir: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_groundwork"));
    cmd.current_dir(dir)
        .arg("--data-dir")
        .arg(dir.join("data"))
        .arg("--log-dir")
        .arg(dir.join("logs"))
        .args(args);
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd.output().unwrap()
}

#[test]
fn e2e_check_ready_exits_zero() {
    let tmp = tempfile::tempdir().unwrap();

    let out = groundwork(tmp.path(), &["check"]);

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(tmp.path().join("data").join("store").is_file());
    assert!(tmp.path().join("logs").is_dir());
}

#[test]
fn e2e_check_path_conflict_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("data"), b"occupied").unwrap();

    let out = groundwork(tmp.path(), &["check"]);

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("PathConflict"), "stderr: {stderr}");
    assert!(stderr.contains("data"), "stderr: {stderr}");
    assert!(!tmp.path().join("logs").exists());
}

#[test]
fn e2e_check_corrupt_store_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("data")).unwrap();
    let garbage = b"plain text where the store belongs\n".repeat(40);
    fs::write(tmp.path().join("data").join("store"), &garbage).unwrap();

    let out = groundwork(tmp.path(), &["check"]);

    assert_eq!(out.status.code(), Some(1));
    assert_eq!(fs::read(tmp.path().join("data").join("store")).unwrap(), garbage);
}

#[test]
fn e2e_invalid_config_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();

    let out = groundwork(tmp.path(), &["--startup-timeout", "0", "check"]);

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn e2e_malformed_config_file_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("groundwork.toml"), "storage_root = [").unwrap();

    let out = groundwork(tmp.path(), &["check"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn e2e_status_json_reports_store() {
    let tmp = tempfile::tempdir().unwrap();

    let out = groundwork(tmp.path(), &["status", "--json"]);

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|l| l.starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON report in: {stdout}"));
    let report: serde_json::Value = serde_json::from_str(line).unwrap();

    assert_eq!(report["store"]["schema_version"], 0);
    assert_eq!(report["store"]["journal_mode"], "delete");
    assert!(report["storage_root"].as_str().unwrap().ends_with("data"));
}
