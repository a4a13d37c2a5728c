//! The server loop.
//!
//! Single-threaded: read one frame, dispatch, write at most one response,
//! repeat. Response order therefore matches request read order, and nothing
//! below this module needs synchronization. The loop is also the single
//! point where component errors become wire error responses.

use std::{
    io::{BufRead, Write},
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use konsol::HostRuntime;
use serde_json::{Value, json};

use crate::{
    framing,
    protocol::{ErrorKind, JSONRPC_VERSION, Method, RpcError, parse_envelope, recover_id},
    sessions::SessionStore,
    wire,
};

/// Exit code for the clean `shutdown` -> `exit` handshake.
const EXIT_CLEAN: i32 = 0;
/// Exit code for everything else: exit without shutdown, stream closure,
/// fatal framing errors.
const EXIT_ABNORMAL: i32 = 1;

/// Protocol server state: the session registry plus lifecycle flags.
pub struct Server {
    store: SessionStore,
    /// Set by the first successful `initialize`. The gate is advisory:
    /// workload requests are served either way, but a conformant client
    /// initializes first.
    initialized: bool,
    /// Set by `shutdown` or by an OS signal; decides the `exit` code and
    /// the post-shutdown request policy.
    shutdown_requested: bool,
    /// Signal-handler flag, checked between messages.
    signal_flag: Arc<AtomicBool>,
}

impl Server {
    #[must_use]
    pub fn new(host: Box<dyn HostRuntime>) -> Self {
        Self::with_signal_flag(host, Arc::new(AtomicBool::new(false)))
    }

    /// Creates a server whose frame-boundary shutdown check observes an
    /// externally registered signal flag.
    #[must_use]
    pub fn with_signal_flag(host: Box<dyn HostRuntime>, signal_flag: Arc<AtomicBool>) -> Self {
        Self {
            store: SessionStore::new(host),
            initialized: false,
            shutdown_requested: false,
            signal_flag,
        }
    }

    /// True once an `initialize` request has been served.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Drives the read -> dispatch -> write cycle until the stream ends, an
    /// `exit` notification arrives, or a signal is observed at a frame
    /// boundary. Returns the process exit code.
    pub fn run(&mut self, reader: &mut impl BufRead, writer: &mut impl Write) -> i32 {
        loop {
            if self.signal_flag.load(Ordering::SeqCst) {
                self.shutdown_requested = true;
                self.store.invalidate_all();
                tracing::info!("shutdown signal observed at frame boundary");
                return EXIT_CLEAN;
            }

            let frame = match framing::read_frame(reader) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("input stream closed");
                    return EXIT_ABNORMAL;
                }
                Err(err) => {
                    tracing::error!(%err, "framing error; message boundaries lost");
                    return EXIT_ABNORMAL;
                }
            };

            let payload = match serde_json::from_slice::<Value>(&frame) {
                Ok(payload) => payload,
                Err(err) => {
                    let error = RpcError::with_message(ErrorKind::Parse, err.to_string());
                    if write_response(writer, &Value::Null, Err(error)).is_err() {
                        return EXIT_ABNORMAL;
                    }
                    continue;
                }
            };
            let payload = wire::from_wire(payload);

            let fallback_id = recover_id(&payload).unwrap_or(Value::Null);
            let envelope = match parse_envelope(payload) {
                Ok(envelope) => envelope,
                Err(error) => {
                    if write_response(writer, &fallback_id, Err(error)).is_err() {
                        return EXIT_ABNORMAL;
                    }
                    continue;
                }
            };

            let Ok(method) = Method::from_str(&envelope.method) else {
                match envelope.id {
                    Some(id) => {
                        let error =
                            RpcError::with_message(ErrorKind::MethodNotFound, format!("unknown method '{}'", envelope.method));
                        if write_response(writer, &id, Err(error)).is_err() {
                            return EXIT_ABNORMAL;
                        }
                    }
                    None => tracing::debug!(method = %envelope.method, "unknown notification dropped"),
                }
                continue;
            };

            // Notifications never get a response; method identity wins over
            // a stray id on `exit` and the reserved stream names.
            if method.is_notification() || envelope.id.is_none() {
                if method == Method::Exit {
                    let code = if self.shutdown_requested { EXIT_CLEAN } else { EXIT_ABNORMAL };
                    tracing::info!(code, "exit notification received");
                    return code;
                }
                if method.is_notification() {
                    tracing::debug!(%method, "client-sent stream notification dropped");
                } else {
                    // A request method without an id runs for its side
                    // effects; failures have no response channel.
                    if let Err(err) = self.dispatch(method, envelope.params) {
                        tracing::debug!(%method, %err, "notification-style request failed");
                    }
                }
                continue;
            }

            let id = envelope.id.unwrap_or(Value::Null);
            // One policy for everything after shutdown: only `exit` is
            // meaningful, every request is refused.
            let outcome = if self.shutdown_requested {
                Err(RpcError::new(ErrorKind::ServerShuttingDown))
            } else {
                self.dispatch(method, envelope.params)
            };
            if write_response(writer, &id, outcome).is_err() {
                return EXIT_ABNORMAL;
            }
        }
    }

    /// Routes one request to its handler.
    fn dispatch(&mut self, method: Method, params: Value) -> Result<Value, RpcError> {
        tracing::debug!(%method, "dispatch");
        match method {
            Method::Initialize => crate::handlers::initialize(&mut self.initialized, params),
            Method::Shutdown => {
                self.shutdown_requested = true;
                tracing::info!("shutdown requested");
                crate::handlers::shutdown(&mut self.store)
            }
            Method::CancelRequest => crate::handlers::cancel_request(params),
            Method::SessionCreate => crate::handlers::session_create(&mut self.store),
            Method::Eval => crate::handlers::eval(&mut self.store, params),
            Method::Interrupt => crate::handlers::interrupt(&mut self.store, params),
            Method::Exit | Method::StdoutChunk | Method::StderrChunk | Method::Status => {
                unreachable!("notifications are handled before dispatch")
            }
        }
    }
}

/// Writes one response, translating to wire case on the way out.
fn write_response(writer: &mut impl Write, id: &Value, outcome: Result<Value, RpcError>) -> std::io::Result<()> {
    let response = match outcome {
        Ok(result) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }),
        Err(error) => {
            tracing::debug!(%error, "request failed");
            json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error.to_wire() })
        }
    };
    framing::write_frame(writer, &wire::to_wire(response)).inspect_err(|err| {
        tracing::error!(%err, "failed to write response");
    })
}
