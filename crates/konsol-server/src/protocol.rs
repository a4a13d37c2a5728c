//! Protocol model: the closed method and error-kind enumerations, the
//! request envelope, and the typed parameter/result shapes.
//!
//! Everything here speaks snake_case; the case translation in [`crate::wire`]
//! has already run by the time a payload reaches `from_wire` constructors,
//! and runs again after `to_wire` serializers. The method and error sets are
//! closed: adding a member is a protocol change, and representing them as
//! enums keeps the dispatcher's match exhaustive.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use strum::{Display, EnumString, IntoStaticStr};

/// Envelope version field; fixed for every message in either direction.
pub const JSONRPC_VERSION: &str = "2.0";

/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "konsol";

/// Server version reported by `initialize` and `--version`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Methods
// =============================================================================

/// The methods this protocol recognizes. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum Method {
    #[strum(serialize = "initialize")]
    Initialize,
    #[strum(serialize = "shutdown")]
    Shutdown,
    #[strum(serialize = "exit")]
    Exit,
    #[strum(serialize = "$/cancelRequest")]
    CancelRequest,
    #[strum(serialize = "konsol/session.create")]
    SessionCreate,
    #[strum(serialize = "konsol/eval")]
    Eval,
    #[strum(serialize = "konsol/interrupt")]
    Interrupt,
    /// Server->client stdout chunk stream. Reserved; not emitted yet.
    #[strum(serialize = "konsol/stdout")]
    StdoutChunk,
    /// Server->client stderr chunk stream. Reserved; not emitted yet.
    #[strum(serialize = "konsol/stderr")]
    StderrChunk,
    /// Server->client busy/idle stream. Reserved; not emitted yet.
    #[strum(serialize = "konsol/status")]
    Status,
}

impl Method {
    /// True for methods that never produce a response, id or not.
    #[must_use]
    pub fn is_notification(self) -> bool {
        matches!(self, Self::Exit | Self::StdoutChunk | Self::StderrChunk | Self::Status)
    }
}

// =============================================================================
// Error kinds
// =============================================================================

/// The error kinds this protocol can report. Closed set.
///
/// Each kind owns its wire code and canonical message; callers override the
/// message only to carry more specific detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    Parse,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    SessionNotFound,
    SessionBusy,
    /// Host runtime failed to boot. The code predates the host-runtime
    /// naming and is kept for wire compatibility.
    HostBootFailed,
    /// Reserved for a future bounded-evaluation mode; never raised.
    EvalTimeout,
    ServerShuttingDown,
}

impl ErrorKind {
    /// The JSON-RPC error code for this kind.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Parse => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::SessionNotFound => -32001,
            Self::SessionBusy => -32002,
            Self::HostBootFailed => -32003,
            Self::EvalTimeout => -32004,
            Self::ServerShuttingDown => -32005,
        }
    }

    /// The default human-readable message for this kind.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Parse => "payload is not valid JSON",
            Self::InvalidRequest => "message is not a valid request envelope",
            Self::MethodNotFound => "method is not recognized",
            Self::InvalidParams => "parameters failed validation",
            Self::Internal => "internal server error",
            Self::SessionNotFound => "session does not exist",
            Self::SessionBusy => "session is currently evaluating",
            Self::HostBootFailed => "host runtime boot failed",
            Self::EvalTimeout => "evaluation timed out",
            Self::ServerShuttingDown => "server is shutting down",
        }
    }
}

/// A structured protocol error, convertible into a response `error` member.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    /// An error carrying the kind's canonical message.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_owned(),
            data: None,
        }
    }

    /// An error with a more specific message.
    #[must_use]
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Serializes into the `error` member of a response.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let mut error = json!({
            "code": self.kind.code(),
            "message": self.message,
        });
        if let Some(data) = &self.data {
            error["data"] = data.clone();
        }
        error
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.kind.code(), self.message)
    }
}

impl std::error::Error for RpcError {}

// =============================================================================
// Envelope
// =============================================================================

/// A classified incoming message: correlation id (absent for
/// notifications), method name, and raw params.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Echoed verbatim in responses; string and integer ids keep their
    /// JSON type.
    pub id: Option<Value>,
    pub method: String,
    /// `Value::Null` when the client omitted params.
    pub params: Value,
}

/// Extracts a best-effort correlation id from a raw payload.
///
/// Used for error responses when the envelope itself is rejected: if the
/// payload at least carries a usable id, the error can still be correlated.
#[must_use]
pub fn recover_id(payload: &Value) -> Option<Value> {
    let id = payload.as_object()?.get("id")?;
    match id {
        Value::String(_) | Value::Number(_) => Some(id.clone()),
        _ => None,
    }
}

/// Validates a JSON payload as a request/notification envelope.
///
/// # Errors
///
/// Returns an `InvalidRequest` error when the payload is not an object,
/// the version field is missing or wrong, the method is not a string, or
/// the id has a non-identifier type.
pub fn parse_envelope(payload: Value) -> Result<Envelope, RpcError> {
    let Value::Object(mut map) = payload else {
        return Err(RpcError::with_message(
            ErrorKind::InvalidRequest,
            "message must be a JSON object",
        ));
    };

    match map.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => {
            return Err(RpcError::with_message(
                ErrorKind::InvalidRequest,
                format!("jsonrpc version field must be \"{JSONRPC_VERSION}\""),
            ));
        }
    }

    let method = match map.get("method") {
        Some(Value::String(method)) => method.clone(),
        _ => {
            return Err(RpcError::with_message(
                ErrorKind::InvalidRequest,
                "method field must be a string",
            ));
        }
    };

    let id = match map.remove("id") {
        None | Some(Value::Null) => None,
        Some(id @ (Value::String(_) | Value::Number(_))) => Some(id),
        Some(other) => {
            return Err(RpcError::with_message(
                ErrorKind::InvalidRequest,
                format!("id must be a string or integer, got {}", json_type_name(&other)),
            ));
        }
    };

    let params = map.remove("params").unwrap_or(Value::Null);
    Ok(Envelope { id, method, params })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Parameter shapes
// =============================================================================

/// Deserializes params for a method whose params may be omitted entirely.
fn optional_params<T: DeserializeOwned + Default>(params: Value) -> Result<T, RpcError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|err| RpcError::with_message(ErrorKind::InvalidParams, err.to_string()))
}

/// Deserializes params for a method that requires them.
fn required_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    if params.is_null() {
        return Err(RpcError::with_message(ErrorKind::InvalidParams, "params are required"));
    }
    serde_json::from_value(params).map_err(|err| RpcError::with_message(ErrorKind::InvalidParams, err.to_string()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeParams {
    #[serde(default)]
    pub process_id: Option<i64>,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

impl InitializeParams {
    /// # Errors
    ///
    /// Returns `InvalidParams` when present params do not match the shape.
    pub fn from_wire(params: Value) -> Result<Self, RpcError> {
        optional_params(params)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalParams {
    pub session_id: String,
    pub code: String,
}

impl EvalParams {
    /// # Errors
    ///
    /// Returns `InvalidParams` when `session_id` or `code` is missing or of
    /// the wrong type.
    pub fn from_wire(params: Value) -> Result<Self, RpcError> {
        required_params(params)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptParams {
    pub session_id: String,
}

impl InterruptParams {
    /// # Errors
    ///
    /// Returns `InvalidParams` when `session_id` is missing.
    pub fn from_wire(params: Value) -> Result<Self, RpcError> {
        required_params(params)
    }
}

/// Params for `$/cancelRequest`: the id of the request to cancel.
#[derive(Debug, Clone)]
pub struct CancelParams {
    pub id: Value,
}

impl CancelParams {
    /// # Errors
    ///
    /// Returns `InvalidParams` unless `id` is a string or integer.
    pub fn from_wire(params: Value) -> Result<Self, RpcError> {
        let id = params
            .as_object()
            .and_then(|map| map.get("id"))
            .ok_or_else(|| RpcError::with_message(ErrorKind::InvalidParams, "id is required"))?;
        match id {
            Value::String(_) | Value::Number(_) => Ok(Self { id: id.clone() }),
            other => Err(RpcError::with_message(
                ErrorKind::InvalidParams,
                format!("id must be a string or integer, got {}", json_type_name(other)),
            )),
        }
    }
}

// =============================================================================
// Result shapes
// =============================================================================

/// Serializes a result shape into a response `result` member.
///
/// # Errors
///
/// Returns an `Internal` error if serialization fails; with these shapes it
/// cannot in practice.
pub fn result_to_wire<T: Serialize>(result: &T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|err| RpcError::with_message(ErrorKind::Internal, err.to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub supports_interrupt: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    pub server_info: ServerInfo,
    pub capabilities: Capabilities,
}

impl InitializeResult {
    /// The capabilities this build reports. Interrupt is accepted but not
    /// enforced, so it is not advertised.
    #[must_use]
    pub fn current() -> Self {
        Self {
            server_info: ServerInfo {
                name: SERVER_NAME,
                version: SERVER_VERSION,
            },
            capabilities: Capabilities {
                supports_interrupt: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCreateResult {
    pub session_id: String,
}

/// Exception details inside an eval result.
///
/// The wire field is `class`; the snake/camel transforms leave it alone.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionInfo {
    #[serde(rename = "class")]
    pub class_name: String,
    pub message: String,
    pub backtrace: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
}

impl From<konsol::Evaluation> for EvalResult {
    fn from(evaluation: konsol::Evaluation) -> Self {
        Self {
            value: evaluation.value,
            value_type: evaluation.value_type,
            stdout: evaluation.stdout,
            stderr: evaluation.stderr,
            exception: evaluation.exception.map(|exc| ExceptionInfo {
                class_name: exc.class_name,
                message: exc.message,
                backtrace: exc.backtrace,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterruptResult {
    pub success: bool,
}

// =============================================================================
// Reserved notification shapes
// =============================================================================

/// Payload of the reserved `konsol/stdout` / `konsol/stderr` streams.
#[derive(Debug, Clone, Serialize)]
pub struct StreamChunkParams {
    pub session_id: String,
    pub chunk: String,
}

/// Payload of the reserved `konsol/status` stream.
#[derive(Debug, Clone, Serialize)]
pub struct StatusParams {
    pub session_id: String,
    pub busy: bool,
}
