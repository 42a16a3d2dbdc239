//! Integration tests for the `telewatch` CLI binary.
//!
//! Everything here runs offline: argument parsing, view token editing,
//! config files in a scratch directory, and error exit codes.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};

// ── Helpers ─────────────────────────────────────────────────────────

/// A `telewatch` command that never sees the user's configuration.
fn telewatch_cmd() -> assert_cmd::Command {
    isolated_cmd(Path::new("/tmp/telewatch-cli-test-nonexistent"))
}

fn isolated_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("telewatch");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("TELEWATCH_PROFILE")
        .env_remove("TELEWATCH_SERVER")
        .env_remove("TELEWATCH_TOKEN")
        .env_remove("TELEWATCH_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut assert_cmd::Command) -> String {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}

const RAW_VIEW: &str = r#"{"layout":[{"i":"3","x":1,"y":2,"w":3,"h":4}],"content":{"3":["sys/tg/1/ampliquad"]},"cardType":{"3":"TREND"}}"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_usage() {
    let output = telewatch_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    telewatch_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("watch")
            .and(predicate::str::contains("view"))
            .and(predicate::str::contains("catalog")),
    );
}

#[test]
fn version_flag() {
    telewatch_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("telewatch"));
}

#[test]
fn completions_bash() {
    telewatch_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── View tokens ─────────────────────────────────────────────────────

#[test]
fn encoded_view_decodes_to_same_cards() {
    let token = stdout_of(telewatch_cmd().args([
        "view",
        "encode",
        "--card",
        "LIST:sys/tg/1/a,sys/tg/1/b",
        "--card",
        "TREND",
        "--title",
        "1=Pressure",
    ]));
    assert!(!token.contains('{'), "token should be base64: {token}");

    let decoded = stdout_of(telewatch_cmd().args(["view", "decode", &token, "-o", "json"]));
    let cards: Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(cards[0]["models"], json!(["sys/tg/1/a", "sys/tg/1/b"]));
    assert_eq!(cards[1]["type"], "TREND");
    assert_eq!(cards[1]["title"], "Pressure");
}

#[test]
fn decode_accepts_raw_json() {
    let decoded = stdout_of(telewatch_cmd().args(["view", "decode", RAW_VIEW, "-o", "json"]));
    let cards: Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(
        cards,
        json!([{
            "index": "3",
            "type": "TREND",
            "x": 1, "y": 2, "w": 3, "h": 4,
            "models": ["sys/tg/1/ampliquad"],
        }])
    );
}

#[test]
fn add_card_continues_numbering() {
    let token = stdout_of(telewatch_cmd().args([
        "view", "add-card", RAW_VIEW, "LIST", "-m", "d/x,d/y", "-t", "Extra",
    ]));
    telewatch_cmd()
        .args(["view", "decode", &token, "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 LIST d/x,d/y"));
}

#[test]
fn invalid_token_is_usage_error() {
    telewatch_cmd()
        .args(["view", "decode", "not a token!"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid view token"));
}

#[test]
fn removing_missing_card_is_not_found() {
    telewatch_cmd()
        .args(["view", "remove-card", RAW_VIEW, "9"])
        .assert()
        .code(4);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn config_path_is_printed() {
    telewatch_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path())
        .args([
            "config",
            "init",
            "--server",
            "https://lab.example",
            "--name",
            "lab",
            "--session-token",
            "hunter2",
            "--plaintext",
        ])
        .assert()
        .success();

    let shown = stdout_of(isolated_cmd(home.path()).args(["config", "show"]));
    assert!(shown.contains("[profiles.lab]"), "{shown}");
    assert!(shown.contains("server = \"https://lab.example/\""), "{shown}");
    assert!(shown.contains("token = \"****\""), "{shown}");
    assert!(!shown.contains("hunter2"));
}

#[test]
fn unknown_profile_is_not_found() {
    telewatch_cmd()
        .args(["--profile", "nope", "watch"])
        .assert()
        .code(4);
}

// ── Server-bound commands ───────────────────────────────────────────

#[test]
fn watch_without_server_is_usage_error() {
    telewatch_cmd().arg("watch").assert().code(2);
}

#[test]
fn watch_stops_after_duration() {
    telewatch_cmd()
        .args([
            "watch",
            "--server",
            "http://127.0.0.1:9",
            "--view",
            RAW_VIEW,
            "--duration",
            "300ms",
        ])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
}
