//! The host-runtime seam.
//!
//! An embedding application can hook two points: a one-shot [`boot`]
//! performed before the first session is created, and per-evaluation
//! wrapping combinators that run each snippet inside host-managed scopes
//! (connection checkout, code reloading, per-request state). The server
//! treats both as opaque: boot either succeeds or fails, and wrappers are
//! closures around the evaluation body.
//!
//! [`boot`]: HostRuntime::boot

use std::fmt;

use crate::{repl_error::ReplError, value::Value};

/// Environment variable selecting the host environment profile.
pub const ENV_PROFILE_VAR: &str = "KONSOL_ENV";

/// Returns the host environment profile (`development` when unset).
#[must_use]
pub fn environment_profile() -> String {
    std::env::var(ENV_PROFILE_VAR).unwrap_or_else(|_| "development".to_owned())
}

/// Failure to boot the host runtime.
#[derive(Debug, Clone)]
pub struct HostError {
    message: String,
}

impl HostError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HostError {}

/// The outcome type wrapped by host combinators.
pub type EvalOutcome = Result<Value, ReplError>;

/// A host combinator that wraps one evaluation.
///
/// Implementations run `body` exactly once, with whatever setup and
/// teardown the host needs around it, and return its outcome (or replace it
/// with a failure of their own).
pub trait EvalWrapper {
    fn wrap(&self, body: &mut dyn FnMut() -> EvalOutcome) -> EvalOutcome;
}

/// An application environment booted lazily before the first session.
pub trait HostRuntime {
    /// Boots the host environment. Called at most once per process; on
    /// failure a later session creation may retry.
    ///
    /// # Errors
    ///
    /// Returns `HostError` when the environment cannot be loaded.
    fn boot(&mut self) -> Result<(), HostError>;

    /// Combinator wrapping every evaluation, outermost. `None` disables
    /// executor wrapping.
    fn executor(&self) -> Option<&dyn EvalWrapper> {
        None
    }

    /// Combinator wrapping every evaluation inside the executor. Only
    /// applied when an executor is present.
    fn reloader(&self) -> Option<&dyn EvalWrapper> {
        None
    }
}

/// Host runtime with no environment to load and no wrapping.
#[derive(Debug, Default)]
pub struct NullHost;

impl HostRuntime for NullHost {
    fn boot(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}
