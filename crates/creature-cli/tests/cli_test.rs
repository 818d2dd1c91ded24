//! Integration tests for the `creature` CLI binary.
//!
//! These cover argument parsing, help output, shell completions, config
//! resolution, and error exit codes -- without a live server or broker.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `creature` binary with env isolation.
///
/// Clears the `CREATURE_*` variables the CLI reads directly and points
/// config directories at a nonexistent path so tests never touch the
/// user's real configuration.
fn creature_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("creature");
    cmd.env("HOME", "/tmp/creature-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/creature-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("CREATURE_CONFIG")
        .env_remove("CREATURE_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

/// A localhost port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn config_arg(path: &Path) -> [String; 2] {
    ["--config".into(), path.display().to_string()]
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = creature_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    creature_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("creature control network")
            .and(predicate::str::contains("listen"))
            .and(predicate::str::contains("monitor"))
            .and(predicate::str::contains("publish")),
    );
}

#[test]
fn test_version_flag() {
    creature_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("creature"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    creature_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("creature"));
}

#[test]
fn test_completions_invalid_shell() {
    creature_cmd().args(["completions", "tcsh"]).assert().code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("elsewhere.toml");
    creature_cmd()
        .args(config_arg(&path))
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("elsewhere.toml"));
}

#[test]
fn test_config_show_merges_file_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [broker]
        host = "broker.workshop"
        username = "beaky"
        password = "squawk"

        [sacn]
        universe = 3
        "#,
    );

    creature_cmd()
        .args(config_arg(&path))
        .env("CREATURE_SACN__UNIVERSE", "7")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("universe = 7")
                .and(predicate::str::contains("broker.workshop"))
                .and(predicate::str::contains("squawk").not()),
        );
}

#[test]
fn test_config_show_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[sacn]\nuniverse = 12\n");

    let output = creature_cmd()
        .args(config_arg(&path))
        .args(["config", "show", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["sacn"]["universe"], 12);
    assert_eq!(value["defaults"]["output"], "table");
}

#[test]
fn test_malformed_config_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[sacn]\nuniverse = \"lots\"\n");

    creature_cmd()
        .args(config_arg(&path))
        .args(["config", "show"])
        .assert()
        .code(2);
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_listen_rejects_universe_zero() {
    creature_cmd()
        .args(["listen", "--universe", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("universe"));
}

#[test]
fn test_publish_requires_topic() {
    creature_cmd()
        .args(["publish", "--message", "hello"])
        .assert()
        .code(2);
}

#[test]
fn test_monitor_rejects_non_websocket_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server]\nurl = \"http://control.local/\"\n");

    creature_cmd()
        .args(config_arg(&path))
        .args(["monitor", "--no-reconnect"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("server.url"));
}

// ── Connection failures ─────────────────────────────────────────────

#[test]
fn test_publish_unreachable_broker_exits_with_connection_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &format!(
            "[broker]\nhost = \"127.0.0.1\"\nport = {}\nconnect_timeout_secs = 2\n",
            closed_port()
        ),
    );

    let output = creature_cmd()
        .args(config_arg(&path))
        .args(["publish", "--topic", "creatures/beaky", "--message", "hi"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("broker"));
}

#[test]
fn test_monitor_unreachable_server_exits_with_connection_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &format!(
            "[server]\nurl = \"ws://127.0.0.1:{}/api/v1/websocket\"\nconnect_timeout_secs = 2\n",
            closed_port()
        ),
    );

    let output = creature_cmd()
        .args(config_arg(&path))
        .args(["monitor", "--no-reconnect"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7), "{}", combined_output(&output));
}

#[test]
fn test_interfaces_json_is_array() {
    let output = creature_cmd()
        .args(["interfaces", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value.is_array());
}
