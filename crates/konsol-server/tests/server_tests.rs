//! End-to-end server loop tests: framed requests in, framed responses out,
//! exit codes per the shutdown handshake.
//!
//! The loop reads until EOF, so a batch of frames drives one `run()` call;
//! server state (sessions, lifecycle flags) persists across `run()` calls
//! on the same `Server`, which lets later batches reference session ids
//! minted by earlier ones.

use std::{
    io::Cursor,
    sync::{Arc, atomic::AtomicBool},
};

use konsol::NullHost;
use konsol_server::{
    framing::{read_frame, write_frame},
    server::Server,
};
use serde_json::{Value, json};

fn server() -> Server {
    Server::new(Box::new(NullHost))
}

/// Writes `messages` as frames, runs the loop to EOF (or exit), and returns
/// the exit code plus every response frame.
fn drive(server: &mut Server, messages: &[Value]) -> (i32, Vec<Value>) {
    let mut input = Vec::new();
    for message in messages {
        write_frame(&mut input, message).unwrap();
    }
    drive_raw(server, input)
}

fn drive_raw(server: &mut Server, input: Vec<u8>) -> (i32, Vec<Value>) {
    let mut reader = Cursor::new(input);
    let mut output = Vec::new();
    let code = server.run(&mut reader, &mut output);

    let mut responses = Vec::new();
    let mut cursor = Cursor::new(output);
    while let Some(frame) = read_frame(&mut cursor).expect("server output must be well framed") {
        responses.push(serde_json::from_slice(&frame).expect("server output must be valid JSON"));
    }
    (code, responses)
}

fn request(id: i64, method: &str, params: Value) -> Value {
    let mut message = json!({"jsonrpc": "2.0", "id": id, "method": method});
    if !params.is_null() {
        message["params"] = params;
    }
    message
}

fn notification(method: &str) -> Value {
    json!({"jsonrpc": "2.0", "method": method})
}

/// Creates a session on the given server and returns its id.
fn create_session(server: &mut Server) -> String {
    let (_, responses) = drive(server, &[request(100, "konsol/session.create", Value::Null)]);
    responses[0]["result"]["sessionId"]
        .as_str()
        .expect("session.create should return a sessionId")
        .to_owned()
}

fn eval_request(id: i64, session_id: &str, code: &str) -> Value {
    request(id, "konsol/eval", json!({"sessionId": session_id, "code": code}))
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Scenario: initialize reports the server identity and capabilities, with
/// camelCase keys and the id echoed as a number.
#[test]
fn initialize_reports_capabilities() {
    let mut server = server();
    let (_, responses) = drive(
        &mut server,
        &[request(1, "initialize", json!({"clientInfo": {"name": "test"}}))],
    );

    assert_eq!(responses.len(), 1);
    let response = &responses[0];
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["serverInfo"]["name"], "konsol");
    assert!(response["result"]["serverInfo"]["version"].is_string());
    assert_eq!(response["result"]["capabilities"]["supportsInterrupt"], json!(false));
    assert!(server.initialized());
}

/// A string id is echoed as a string.
#[test]
fn string_ids_are_echoed_verbatim() {
    let mut server = server();
    let (_, responses) = drive(
        &mut server,
        &[json!({"jsonrpc": "2.0", "id": "req-1", "method": "shutdown"})],
    );
    assert_eq!(responses[0]["id"], json!("req-1"));
    assert_eq!(responses[0]["result"], Value::Null, "shutdown result is null");
}

/// Scenario: shutdown then exit is the clean handshake, exit code 0.
#[test]
fn clean_shutdown_handshake_exits_zero() {
    let mut server = server();
    let (code, responses) = drive(
        &mut server,
        &[request(6, "shutdown", Value::Null), notification("exit")],
    );
    assert_eq!(code, 0, "shutdown then exit must exit 0");
    assert_eq!(responses.len(), 1, "exit must not produce a response");
    assert_eq!(responses[0]["result"], Value::Null);
}

/// Exit without a prior shutdown exits 1.
#[test]
fn exit_without_shutdown_exits_one() {
    let mut server = server();
    let (code, responses) = drive(&mut server, &[notification("exit")]);
    assert_eq!(code, 1);
    assert!(responses.is_empty());
}

/// Stream closure without an exit notification exits 1.
#[test]
fn stream_closure_exits_one() {
    let mut server = server();
    let (code, _) = drive(&mut server, &[request(1, "initialize", Value::Null)]);
    assert_eq!(code, 1, "EOF without the handshake is abnormal");
}

/// A signal observed at the frame boundary shuts the loop down cleanly.
#[test]
fn signal_flag_stops_the_loop() {
    let flag = Arc::new(AtomicBool::new(true));
    let mut server = Server::with_signal_flag(Box::new(NullHost), Arc::clone(&flag));
    let (code, responses) = drive(&mut server, &[request(1, "initialize", Value::Null)]);
    assert_eq!(code, 0, "signal shutdown is clean");
    assert!(responses.is_empty(), "no frame is processed after the signal");
}

/// After shutdown, requests other than shutdown itself are refused with the
/// shutting-down kind; sessions are gone either way.
#[test]
fn requests_after_shutdown_are_refused() {
    let mut server = server();
    let session_id = create_session(&mut server);
    let (_, responses) = drive(
        &mut server,
        &[
            request(1, "shutdown", Value::Null),
            request(2, "konsol/session.create", Value::Null),
            eval_request(3, &session_id, "1"),
        ],
    );
    assert_eq!(responses[1]["error"]["code"], json!(-32005));
    assert_eq!(responses[2]["error"]["code"], json!(-32005));
}

/// `$/cancelRequest` is accepted and returns a null result.
#[test]
fn cancel_request_is_accepted() {
    let mut server = server();
    let (_, responses) = drive(&mut server, &[request(4, "$/cancelRequest", json!({"id": 3}))]);
    assert_eq!(responses[0]["result"], Value::Null);
}

// =============================================================================
// Error responses
// =============================================================================

/// An unknown method in a request produces -32601.
#[test]
fn unknown_method_is_reported() {
    let mut server = server();
    let (_, responses) = drive(&mut server, &[request(9, "konsol/unknown", Value::Null)]);
    assert_eq!(responses[0]["error"]["code"], json!(-32601));
    assert_eq!(responses[0]["id"], json!(9));
}

/// An unknown notification is dropped without a response.
#[test]
fn unknown_notification_is_dropped() {
    let mut server = server();
    let (_, responses) = drive(&mut server, &[notification("konsol/unknown")]);
    assert!(responses.is_empty());
}

/// A frame whose payload is not JSON produces -32700 with a null id.
#[test]
fn bad_json_produces_parse_error() {
    let mut server = server();
    let body = b"{definitely not json";
    let mut input = Vec::new();
    input.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    input.extend_from_slice(body);

    let (_, responses) = drive_raw(&mut server, input);
    assert_eq!(responses[0]["error"]["code"], json!(-32700));
    assert_eq!(responses[0]["id"], Value::Null);
}

/// Valid JSON that is not an envelope produces -32600, echoing the id when
/// one is recoverable.
#[test]
fn bad_envelope_produces_invalid_request() {
    let mut server = server();
    let (_, responses) = drive(
        &mut server,
        &[json!({"jsonrpc": "1.0", "id": 8, "method": "shutdown"})],
    );
    assert_eq!(responses[0]["error"]["code"], json!(-32600));
    assert_eq!(responses[0]["id"], json!(8));
}

/// A known method with bad params produces -32602.
#[test]
fn bad_params_produce_invalid_params() {
    let mut server = server();
    let (_, responses) = drive(
        &mut server,
        &[request(2, "konsol/eval", json!({"sessionId": "only"}))],
    );
    assert_eq!(responses[0]["error"]["code"], json!(-32602));
}

/// A framing error is fatal: the loop exits 1 without answering.
#[test]
fn framing_error_is_fatal() {
    let mut server = server();
    let (code, responses) = drive_raw(&mut server, b"Content-Length: nope\r\n\r\n{}".to_vec());
    assert_eq!(code, 1);
    assert!(responses.is_empty());
}

// =============================================================================
// Workload
// =============================================================================

/// Scenario: session creation, then persistent evaluation across requests.
#[test]
fn session_create_and_eval_persistence() {
    let mut server = server();
    let (_, responses) = drive(&mut server, &[request(2, "konsol/session.create", Value::Null)]);
    let session_id = responses[0]["result"]["sessionId"].as_str().unwrap().to_owned();

    let (_, responses) = drive(
        &mut server,
        &[
            eval_request(3, &session_id, "x = 123"),
            eval_request(4, &session_id, "x + 1"),
        ],
    );

    let first = &responses[0]["result"];
    assert_eq!(first["value"], "123");
    assert_eq!(first["valueType"], "Integer");
    assert_eq!(first["stdout"], "");
    assert_eq!(first["stderr"], "");
    assert!(first.get("exception").is_none(), "no exception key on success");

    let second = &responses[1]["result"];
    assert_eq!(second["value"], "124");
    assert_eq!(second["valueType"], "Integer");
}

/// Workload requests are served before initialize; the gate is advisory.
#[test]
fn workload_is_served_before_initialize() {
    let mut server = server();
    let (_, responses) = drive(&mut server, &[request(1, "konsol/session.create", Value::Null)]);
    assert!(
        responses[0]["result"]["sessionId"].is_string(),
        "got: {}",
        responses[0]
    );
}

/// Distinct sessions get distinct ids.
#[test]
fn session_ids_are_distinct_over_the_wire() {
    let mut server = server();
    let (_, responses) = drive(
        &mut server,
        &[
            request(1, "konsol/session.create", Value::Null),
            request(2, "konsol/session.create", Value::Null),
        ],
    );
    let first = responses[0]["result"]["sessionId"].as_str().unwrap();
    let second = responses[1]["result"]["sessionId"].as_str().unwrap();
    assert_ne!(first, second);
}

/// Scenario: stdout capture rides in the result; the value is nil.
#[test]
fn eval_captures_stdout() {
    let mut server = server();
    let session_id = create_session(&mut server);
    let (_, responses) = drive(&mut server, &[eval_request(5, &session_id, "puts \"hi\"")]);

    let result = &responses[0]["result"];
    assert_eq!(result["stdout"], "hi\n");
    assert_eq!(result["value"], "nil");
    assert_eq!(result["valueType"], "NilClass");
}

/// stderr is captured separately from stdout.
#[test]
fn eval_captures_stderr() {
    let mut server = server();
    let session_id = create_session(&mut server);
    let (_, responses) = drive(&mut server, &[eval_request(5, &session_id, "warn \"error\"")]);

    let result = &responses[0]["result"];
    assert_eq!(result["stderr"], "error\n");
    assert_eq!(result["stdout"], "");
}

/// Scenario: exception capture with class, message, and backtrace.
#[test]
fn eval_reports_exceptions() {
    let mut server = server();
    let session_id = create_session(&mut server);
    let (_, responses) = drive(&mut server, &[eval_request(5, &session_id, "raise \"boom\"")]);

    let exception = &responses[0]["result"]["exception"];
    assert_eq!(exception["class"], "RuntimeError");
    assert_eq!(exception["message"], "boom");
    let backtrace = exception["backtrace"].as_array().unwrap();
    assert!(!backtrace.is_empty(), "backtrace must be non-empty");
    assert!(responses[0]["result"].get("valueType").is_none());
}

/// A session remains usable after an exception.
#[test]
fn session_survives_exceptions() {
    let mut server = server();
    let session_id = create_session(&mut server);
    let (_, responses) = drive(
        &mut server,
        &[
            eval_request(5, &session_id, "kept = 1\nraise \"boom\""),
            eval_request(6, &session_id, "kept + 1"),
        ],
    );
    assert_eq!(responses[1]["result"]["value"], "2");
}

/// Scenario: eval against an unknown session id is -32001.
#[test]
fn eval_unknown_session_is_reported() {
    let mut server = server();
    let (_, responses) = drive(
        &mut server,
        &[eval_request(5, "00000000-0000-0000-0000-000000000000", "1")],
    );
    assert_eq!(responses[0]["error"]["code"], json!(-32001));
}

/// Interrupt on a live idle session reports success.
#[test]
fn interrupt_reports_success() {
    let mut server = server();
    let session_id = create_session(&mut server);
    let (_, responses) = drive(
        &mut server,
        &[request(7, "konsol/interrupt", json!({"sessionId": session_id}))],
    );
    assert_eq!(responses[0]["result"]["success"], json!(true));
}

/// Interrupt on an unknown session is -32001.
#[test]
fn interrupt_unknown_session_is_reported() {
    let mut server = server();
    let (_, responses) = drive(
        &mut server,
        &[request(7, "konsol/interrupt", json!({"sessionId": "nope"}))],
    );
    assert_eq!(responses[0]["error"]["code"], json!(-32001));
}

/// The full literal conversation from the protocol contract, in one batch.
#[test]
fn full_conversation() {
    let mut server = server();
    let session_id = create_session(&mut server);
    let (code, responses) = drive(
        &mut server,
        &[
            request(1, "initialize", json!({"clientInfo": {"name": "test"}})),
            eval_request(3, &session_id, "x = 123"),
            eval_request(4, &session_id, "x + 1"),
            eval_request(5, &session_id, "puts \"hi\""),
            request(6, "shutdown", Value::Null),
            notification("exit"),
        ],
    );

    assert_eq!(code, 0);
    assert_eq!(responses.len(), 5, "five requests, five responses, no more");
    assert_eq!(responses[0]["result"]["capabilities"]["supportsInterrupt"], json!(false));
    assert_eq!(responses[1]["result"]["value"], "123");
    assert_eq!(responses[2]["result"]["value"], "124");
    assert_eq!(responses[3]["result"]["stdout"], "hi\n");
    assert_eq!(responses[4]["result"], Value::Null);

    // Response ids come back in request read order.
    let ids: Vec<_> = responses.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(3), json!(4), json!(5), json!(6)]);
}
