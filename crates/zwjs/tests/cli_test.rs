//! Integration tests for the `zwjs` CLI binary.
//!
//! Argument parsing, config handling and error exit codes run without a
//! server. The round-trip tests start a small in-process WebSocket server
//! that answers like Z-Wave JS Server.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::thread::JoinHandle;

use assert_cmd::cargo::cargo_bin_cmd;
use futures_util::{SinkExt, StreamExt};
use predicates::prelude::*;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `zwjs` binary with env isolation.
///
/// Clears all `ZWJS_*` env vars and points config directories at `home`
/// so tests never touch the user's real configuration.
fn zwjs_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("zwjs");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("ZWJS_PROFILE")
        .env_remove("ZWJS_SERVER")
        .env_remove("ZWJS_TIMEOUT")
        .env_remove("ZWJS_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Write `body` where the binary looks for its config under `home`.
fn write_config(home: &Path, body: &str) {
    let path = home.join(".config").join("zwjs").join("config.toml");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, body).unwrap();
}

/// A port with nothing listening on it.
fn closed_port() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Serve one connection: send the handshake, answer every command with
/// the given nested `success`, and return every frame the CLI sent.
fn spawn_server(nested_success: bool) -> (String, JoinHandle<Vec<Value>>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let version = json!({ "type": "version", "serverVersion": "1.33.0" });
            ws.send(Message::Text(version.to_string().into())).await.unwrap();

            let mut frames = Vec::new();
            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                let reply = json!({
                    "type": "result",
                    "success": true,
                    "messageId": frame["messageId"],
                    "result": { "success": nested_success }
                });
                frames.push(frame);
                if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }
            }
            frames
        })
    });

    (addr, handle)
}

fn commands_of(frames: &[Value]) -> Vec<&str> {
    frames.iter().filter_map(|f| f["command"].as_str()).collect()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = zwjs_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    zwjs_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("Z-Wave JS")
            .and(predicate::str::contains("listen"))
            .and(predicate::str::contains("include"))
            .and(predicate::str::contains("exclude"))
            .and(predicate::str::contains("set-value")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    zwjs_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("zwjs"));
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    zwjs_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_command_class() {
    let home = tempfile::tempdir().unwrap();
    let output = zwjs_cmd(home.path())
        .args(["set-value", "--node", "5", "--command-class", "0xzz", "--value", "1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("command class"));
}

#[test]
fn test_wait_timeout_requires_wait() {
    let home = tempfile::tempdir().unwrap();
    zwjs_cmd(home.path())
        .args(["exclude", "start", "--wait-timeout", "5"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();

    zwjs_cmd(home.path())
        .args(["config", "init", "--server", "hub.local:3000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("profile 'default' written"));

    zwjs_cmd(home.path())
        .args(["-o", "json-compact", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""server":"hub.local:3000""#));

    // A second init for the same profile needs --force
    zwjs_cmd(home.path())
        .args(["config", "init", "--server", "other:3000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_path_is_under_config_home() {
    let home = tempfile::tempdir().unwrap();
    zwjs_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_output_default_applies_without_flag() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), "[defaults]\noutput = \"json-compact\"\n");

    zwjs_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(r#"{"default_profile":"#));

    // An explicit flag still wins
    zwjs_cmd(home.path())
        .args(["-o", "yaml", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("output: json-compact"));
}

#[test]
fn test_disabled_profile_refuses_to_connect() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        "[profiles.attic]\nserver = \"127.0.0.1:1\"\ndisabled = true\n",
    );

    zwjs_cmd(home.path())
        .args(["--profile", "attic", "include", "start"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("disabled"));
}

// ── Server errors ───────────────────────────────────────────────────

#[test]
fn test_unreachable_server_exit_code() {
    let home = tempfile::tempdir().unwrap();
    zwjs_cmd(home.path())
        .args(["--server", &closed_port(), "include", "stop"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Could not connect"));
}

// ── Round trips ─────────────────────────────────────────────────────

#[test]
fn test_include_start_round_trip() {
    let home = tempfile::tempdir().unwrap();
    let (addr, server) = spawn_server(true);

    zwjs_cmd(home.path())
        .args(["--server", &addr, "include", "start"])
        .assert()
        .success()
        .stdout(predicate::str::contains("include start: ok"));

    let frames = server.join().unwrap();
    assert_eq!(
        commands_of(&frames),
        vec![
            "driver.disable_statistics",
            "start_listening",
            "controller.begin_inclusion"
        ]
    );
    assert_eq!(frames[2]["options"], json!({ "strategy": "Security_S0" }));
}

#[test]
fn test_rejected_command_exit_code() {
    let home = tempfile::tempdir().unwrap();
    let (addr, server) = spawn_server(false);

    zwjs_cmd(home.path())
        .args(["--server", &addr, "exclude", "stop"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("rejected"));

    let frames = server.join().unwrap();
    assert_eq!(commands_of(&frames).last(), Some(&"controller.stop_exclusion"));
}

#[test]
fn test_set_value_round_trip() {
    let home = tempfile::tempdir().unwrap();
    let (addr, server) = spawn_server(true);

    zwjs_cmd(home.path())
        .args([
            "--server",
            &addr,
            "set-value",
            "--node",
            "5",
            "--command-class",
            "0x20",
            "--value",
            "99",
        ])
        .assert()
        .success();

    let frames = server.join().unwrap();
    let frame = frames
        .iter()
        .find(|f| f["command"] == "node.set_value")
        .expect("set_value frame");
    assert_eq!(frame["nodeId"], 5);
    assert_eq!(
        frame["valueId"],
        json!({ "commandClass": 32, "property": "targetValue" })
    );
    assert_eq!(frame["value"], 99);
}

#[test]
fn test_send_passes_frame_through() {
    let home = tempfile::tempdir().unwrap();
    let (addr, server) = spawn_server(true);

    zwjs_cmd(home.path())
        .args([
            "--server",
            &addr,
            "send",
            r#"{"messageId":"raw-1","command":"controller.get_state"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("controller.get_state: sent"));

    let frames = server.join().unwrap();
    assert!(frames.iter().any(|f| f["messageId"] == "raw-1"));
}
