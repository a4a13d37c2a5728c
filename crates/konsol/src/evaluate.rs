//! Structured evaluation wrapper.
//!
//! [`evaluate`] is the one entry point the server calls per `konsol/eval`
//! request: it captures console output, applies host-runtime wrapping, and
//! folds every snippet failure into the returned [`Evaluation`] so the
//! caller never sees a snippet error as a Rust error.

use crate::{
    exception::Exception,
    host::{EvalOutcome, HostRuntime},
    io::CollectConsole,
    repl::ReplSession,
    repl_error::ReplError,
};

/// Exception details as reported to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionReport {
    /// Printable class name, e.g. `RuntimeError`.
    pub class_name: String,
    pub message: String,
    /// Innermost frame first; never relied on to be non-empty by the
    /// protocol, but the evaluator records at least the raising statement.
    pub backtrace: Vec<String>,
}

impl From<Exception> for ExceptionReport {
    fn from(exc: Exception) -> Self {
        let (class_name, message, backtrace) = exc.into_parts();
        Self {
            class_name: class_name.to_owned(),
            message,
            backtrace,
        }
    }
}

/// The structured result of one evaluation.
///
/// `exception` is present exactly when the snippet raised; `value` and
/// `value_type` describe the result otherwise. `stdout`/`stderr` carry
/// whatever the snippet wrote, raise or not.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Inspect rendering of the result value; empty when an exception was
    /// raised.
    pub value: String,
    /// Dynamic type name of the result; absent when an exception was raised.
    pub value_type: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exception: Option<ExceptionReport>,
}

/// Evaluates one snippet against a session with output capture and optional
/// host wrapping.
///
/// Snippet failures (syntax errors included) are captured into the result's
/// `exception` field; this function only propagates programming errors of
/// the evaluator itself (as panics).
pub fn evaluate(session: &mut ReplSession, code: &str, host: Option<&dyn HostRuntime>) -> Evaluation {
    let mut console = CollectConsole::new();

    let outcome = {
        let mut body = || session.execute(code, &mut console);
        run_wrapped(host, &mut body)
    };

    let (stdout, stderr) = console.into_parts();
    match outcome {
        Ok(value) => Evaluation {
            value: value.inspect(),
            value_type: Some(value.type_name().to_owned()),
            stdout,
            stderr,
            exception: None,
        },
        Err(ReplError::Runtime(exc)) => Evaluation {
            value: String::new(),
            value_type: None,
            stdout,
            stderr,
            exception: Some(exc.into()),
        },
        Err(ReplError::Parse(parse_error)) => {
            let mut exc = Exception::syntax_error(parse_error.to_string());
            exc.push_frame(format!("{}:{}:in `<main>'", session.script_name(), parse_error.line()));
            Evaluation {
                value: String::new(),
                value_type: None,
                stdout,
                stderr,
                exception: Some(exc.into()),
            }
        }
    }
}

/// Applies host combinators around the evaluation body.
///
/// With both hooks present the execution order is
/// `executor.wrap { reloader.wrap { body } }`; with only an executor, just
/// the executor; otherwise the body runs bare.
fn run_wrapped(host: Option<&dyn HostRuntime>, body: &mut dyn FnMut() -> EvalOutcome) -> EvalOutcome {
    let Some(host) = host else {
        return body();
    };
    match (host.executor(), host.reloader()) {
        (Some(executor), Some(reloader)) => executor.wrap(&mut || reloader.wrap(&mut *body)),
        (Some(executor), None) => executor.wrap(body),
        (None, _) => body(),
    }
}
