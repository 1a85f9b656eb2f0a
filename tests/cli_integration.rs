//! Integration tests for CLI commands.
//!
//! These tests run the binary against a throwaway config directory and never
//! need a running daemon.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a Command for the udm binary with an isolated config directory
fn udm(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("udm").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path())
        .env("HOME", home.path())
        .env_remove("DBUS_SESSION_BUS_ADDRESS");
    cmd
}

fn write_config(home: &TempDir, contents: &str) {
    let dir = home.path().join("udm");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_help_command() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Client for the Ubuntu download manager"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("throttle"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("udm"));
}

#[test]
fn test_config_show_creates_default_file() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[events]"))
        .stdout(predicate::str::contains("buffer = 16"))
        .stdout(predicate::str::contains("algorithm = \"sha256\""));

    assert!(home.path().join("udm").join("config.toml").exists());
}

#[test]
fn test_config_update_persists() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .args(["config", "--throttle", "1024", "--algorithm", "SHA512"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration updated"));

    udm(&home)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("throttle = 1024"))
        .stdout(predicate::str::contains("algorithm = \"sha512\""));
}

#[test]
fn test_config_without_changes() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes specified"));
}

#[test]
fn test_config_rejects_invalid_log_level() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .args(["config", "--log-level", "loud"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let home = TempDir::new().unwrap();
    write_config(&home, "[events]\nbuffer = 0\n");
    udm(&home)
        .args(["config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("events.buffer"));
}

#[test]
fn test_download_rejects_unknown_algorithm() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .args([
            "download",
            "http://example.com/a",
            "--hash",
            "abc",
            "--algorithm",
            "crc32",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown hash algorithm"));
}

#[test]
fn test_download_algorithm_requires_hash() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .args(["download", "http://example.com/a", "--algorithm", "md5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--algorithm requires --hash"));
}

#[test]
fn test_list_fails_without_bus() {
    let home = TempDir::new().unwrap();
    let socket = home.path().join("no-such-bus");
    write_config(
        &home,
        &format!("[bus]\naddress = \"unix:path={}\"\n", socket.display()),
    );
    udm(&home)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Transport error"));
}

#[test]
fn test_upload_requires_file() {
    let home = TempDir::new().unwrap();
    udm(&home)
        .args(["upload", "http://example.com/in"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FILE"));
}
