//! Binary surface: help, exit codes, validation

use crate::common::ORG;
use assert_cmd::Command;
use tempfile::TempDir;

fn command(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catalog-export").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("ORGID")
        .env_remove("BEARER")
        .env_remove("BASEURL")
        .env_remove("LOGLEVEL")
        .env_remove("INCLUDEBOM")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = command(&dir).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("export"));
    assert!(stdout.contains("validate"));
}

#[test]
fn test_missing_org_id_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    command(&dir)
        .args(["export", "--bearer", "token", "--base-url", "http://127.0.0.1:9"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_org_id_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    command(&dir)
        .args(["validate", "--org-id", "A", "--bearer", "token", "--base-url", "http://127.0.0.1:9"])
        .assert()
        .code(1);
}

#[test]
fn test_validate_reports_cursor_without_touching_it() {
    let dir = TempDir::new().unwrap();
    let cursor = dir.path().join("lastrun.json");
    std::fs::write(&cursor, "{ broken").unwrap();

    let output = command(&dir)
        .args(["validate", "--org-id", ORG, "--bearer", "token", "--base-url", "http://127.0.0.1:9"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration is valid"));
    assert!(stdout.contains("invalid"));
    assert!(cursor.exists());
}

#[test]
fn test_environment_supplies_settings() {
    let dir = TempDir::new().unwrap();
    command(&dir)
        .env("ORGID", ORG)
        .env("BEARER", "token")
        .env("BASEURL", "http://127.0.0.1:9")
        .arg("validate")
        .assert()
        .success();
}
