//! Executable-level tests: CLI switches and a full framed conversation
//! against the real binary on stdio.

use assert_cmd::Command;
use serde_json::{Value, json};

fn konsol_server() -> Command {
    Command::cargo_bin("konsol-server").expect("binary should build")
}

fn frame(message: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(message).unwrap();
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    out
}

/// Splits raw stdout back into JSON response payloads.
fn parse_frames(mut raw: &[u8]) -> Vec<Value> {
    let mut responses = Vec::new();
    while !raw.is_empty() {
        let header_end = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .expect("output should contain a blank line");
        let headers = std::str::from_utf8(&raw[..header_end]).unwrap();
        let length: usize = headers
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length:"))
            .expect("output should carry Content-Length")
            .trim()
            .parse()
            .unwrap();
        let body_start = header_end + 4;
        responses.push(serde_json::from_slice(&raw[body_start..body_start + length]).unwrap());
        raw = &raw[body_start + length..];
    }
    responses
}

#[test]
fn version_prints_and_exits_zero() {
    let assert = konsol_server().arg("--version").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.starts_with("konsol "), "got: {stdout:?}");
}

#[test]
fn help_prints_usage() {
    let assert = konsol_server().arg("--help").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("--stdio"), "got: {stdout:?}");
}

#[test]
fn missing_transport_is_a_usage_error() {
    konsol_server().assert().code(2);
}

#[test]
fn unknown_option_is_a_usage_error() {
    konsol_server().arg("--tcp").assert().code(2);
}

/// The clean handshake over real pipes: initialize, shutdown, exit, code 0.
#[test]
fn stdio_handshake_exits_zero() {
    let mut input = Vec::new();
    input.extend(frame(&json!({
        "jsonrpc": "2.0", "id": 1, "method": "initialize",
        "params": {"clientInfo": {"name": "cli-test"}}
    })));
    input.extend(frame(&json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"})));
    input.extend(frame(&json!({"jsonrpc": "2.0", "method": "exit"})));

    let assert = konsol_server().arg("--stdio").write_stdin(input).assert().code(0);
    let responses = parse_frames(&assert.get_output().stdout);

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "konsol");
    assert_eq!(responses[0]["result"]["capabilities"]["supportsInterrupt"], json!(false));
    assert_eq!(responses[1]["result"], Value::Null);
}

/// EOF without the handshake exits 1.
#[test]
fn stdio_eof_exits_one() {
    let input = frame(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}));
    konsol_server().arg("--stdio").write_stdin(input).assert().code(1);
}

/// Protocol frames stay on stdout even with logging enabled on stderr.
#[test]
fn logging_stays_off_stdout() {
    let mut input = Vec::new();
    input.extend(frame(&json!({"jsonrpc": "2.0", "id": 1, "method": "shutdown"})));
    input.extend(frame(&json!({"jsonrpc": "2.0", "method": "exit"})));

    let assert = konsol_server()
        .arg("--stdio")
        .env("RUST_LOG", "debug")
        .write_stdin(input)
        .assert()
        .code(0);

    // Every stdout byte must belong to a frame.
    let responses = parse_frames(&assert.get_output().stdout);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["result"], Value::Null);
}
