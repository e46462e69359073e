//! Shared E2E test helpers for `rlm-sandbox` binary tests.

#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use std::time::Duration;

/// Default timeout for a single sandbox run.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Environment variables that would leak host config into the run.
const RLM_ENV_VARS: &[&str] = &[
    "RLM_DEBUG",
    "RLM_BRIDGE_PREFIX",
    "RLM_LOG_FILE",
    "RLM_LOG_LEVEL",
    "RUST_LOG",
];

/// Build a Command isolated from user and project config.
///
/// Returns (command, _guard); keep the guard alive for the test's duration.
pub fn sandbox_cmd() -> (assert_cmd::Command, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create temp dir for config isolation");
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("rlm-sandbox");
    cmd.timeout(TIMEOUT_BASIC);
    for var in RLM_ENV_VARS {
        cmd.env_remove(var);
    }
    let dir = tmp.path().to_str().expect("valid utf8");
    cmd.env("HOME", dir);
    cmd.args(["-C", dir]);
    cmd.args([
        "--config",
        tmp.path()
            .join("global.toml")
            .to_str()
            .expect("valid utf8"),
    ]);
    (cmd, tmp)
}

/// One request line.
pub fn request(id: &str, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

/// One `execute` request line.
pub fn execute(id: &str, code: &str) -> String {
    request(id, "execute", json!({ "code": code }))
}

/// One bridge reply line.
pub fn reply(id: &str, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

/// Joins lines into stdin content.
pub fn stdin_of(lines: &[String]) -> String {
    let mut input = lines.join("\n");
    input.push('\n');
    input
}

/// Parses every stdout line as JSON.
pub fn parse_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line must be JSON"))
        .collect()
}
