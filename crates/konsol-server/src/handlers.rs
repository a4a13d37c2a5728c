//! Request handlers.
//!
//! Each handler parses its parameter shape, delegates to the session store,
//! and serializes a snake_case result value. The server loop owns error
//! conversion to wire responses; handlers just return `RpcError`.

use serde_json::Value;

use crate::{
    protocol::{
        CancelParams, ErrorKind, EvalParams, EvalResult, InitializeParams, InitializeResult, InterruptParams,
        InterruptResult, RpcError, SessionCreateResult, result_to_wire,
    },
    sessions::{SessionStore, StoreError},
};

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        let kind = match err {
            StoreError::NotFound(_) => ErrorKind::SessionNotFound,
            StoreError::Busy(_) => ErrorKind::SessionBusy,
            StoreError::BootFailed(_) => ErrorKind::HostBootFailed,
        };
        RpcError::with_message(kind, err.to_string())
    }
}

/// `initialize`: records the handshake and reports server capabilities.
///
/// Idempotent with respect to the returned capabilities; repeated calls
/// just re-report them.
///
/// # Errors
///
/// Returns `InvalidParams` when present params do not match the shape.
pub fn initialize(initialized: &mut bool, params: Value) -> Result<Value, RpcError> {
    let params = InitializeParams::from_wire(params)?;
    if let Some(client) = &params.client_info {
        tracing::info!(
            client = %client.name,
            version = client.version.as_deref().unwrap_or("unknown"),
            "client initialized"
        );
    }
    *initialized = true;
    result_to_wire(&InitializeResult::current())
}

/// `shutdown`: destroys all sessions and returns a null result.
///
/// The loop flips its shutdown flag at the dispatch site so the policy for
/// later requests lives in one place.
pub fn shutdown(store: &mut SessionStore) -> Result<Value, RpcError> {
    store.invalidate_all();
    Ok(Value::Null)
}

/// `$/cancelRequest`: accepted and logged; nothing is cancelled yet.
///
/// # Errors
///
/// Returns `InvalidParams` unless the params carry a usable id.
pub fn cancel_request(params: Value) -> Result<Value, RpcError> {
    let params = CancelParams::from_wire(params)?;
    tracing::debug!(id = %params.id, "cancel requested; not supported, ignoring");
    Ok(Value::Null)
}

/// `konsol/session.create`: registers a fresh session.
///
/// # Errors
///
/// Returns `HostBootFailed` when the first-session host boot fails.
pub fn session_create(store: &mut SessionStore) -> Result<Value, RpcError> {
    let session_id = store.create_session()?;
    result_to_wire(&SessionCreateResult { session_id })
}

/// `konsol/eval`: evaluates a snippet in a session.
///
/// # Errors
///
/// Returns `InvalidParams`, `SessionNotFound`, or `SessionBusy`; snippet
/// failures are not errors, they ride in the result's exception field.
pub fn eval(store: &mut SessionStore, params: Value) -> Result<Value, RpcError> {
    let params = EvalParams::from_wire(params)?;
    let evaluation = store.evaluate_in(&params.session_id, &params.code)?;
    if let Some(exception) = &evaluation.exception {
        tracing::debug!(
            session_id = %params.session_id,
            class = %exception.class_name,
            "evaluation raised"
        );
    }
    result_to_wire(&EvalResult::from(evaluation))
}

/// `konsol/interrupt`: marks a busy session interrupted.
///
/// Always reports success; enforcement is a future capability and clients
/// are told so via `supports_interrupt: false`.
///
/// # Errors
///
/// Returns `InvalidParams` or `SessionNotFound`.
pub fn interrupt(store: &mut SessionStore, params: Value) -> Result<Value, RpcError> {
    let params = InterruptParams::from_wire(params)?;
    let was_busy = store.interrupt(&params.session_id)?;
    if !was_busy {
        tracing::debug!(session_id = %params.session_id, "interrupt on idle session ignored");
    }
    result_to_wire(&InterruptResult { success: true })
}
