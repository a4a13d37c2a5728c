//! Session registry with lazy host-runtime boot.
//!
//! The store owns every live session plus the host runtime and its one-shot
//! boot flag. It is only ever touched from the server loop's thread, so no
//! locking is needed; the busy flag on each session exists to refuse
//! re-entrant evaluation, not to synchronize threads.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind, resume_unwind},
    time::SystemTime,
};

use ahash::AHashMap;
use konsol::{Evaluation, HostRuntime, ReplSession, evaluate};
use uuid::Uuid;

/// Script name sessions report in backtrace frames.
const SESSION_SCRIPT_NAME: &str = "(konsol)";

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// An evaluation is in flight.
    Busy,
    /// An interrupt was registered while busy; drains back to idle when the
    /// evaluation finishes.
    Interrupted,
}

/// One live session: persistent evaluation context plus lifecycle state.
#[derive(Debug)]
pub struct Session {
    id: String,
    repl: ReplSession,
    state: SessionState,
    created_at: SystemTime,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            repl: ReplSession::new(SESSION_SCRIPT_NAME),
            state: SessionState::Idle,
            created_at: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

/// Errors from session-store operations.
///
/// Kept as a typed enum so the dispatch layer can map each case to its wire
/// error kind without string matching.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// No live session has the given id.
    NotFound(String),
    /// The target session is mid-evaluation.
    Busy(String),
    /// The host runtime failed to boot; the boot may be retried.
    BootFailed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "session '{id}' not found"),
            Self::Busy(id) => write!(f, "session '{id}' is busy"),
            Self::BootFailed(message) => write!(f, "host runtime boot failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Registry of live sessions plus the host runtime boot gate.
pub struct SessionStore {
    sessions: AHashMap<String, Session>,
    host: Box<dyn HostRuntime>,
    host_booted: bool,
}

impl SessionStore {
    #[must_use]
    pub fn new(host: Box<dyn HostRuntime>) -> Self {
        Self {
            sessions: AHashMap::new(),
            host,
            host_booted: false,
        }
    }

    /// Creates a session, booting the host runtime first if this process
    /// has not booted it yet.
    ///
    /// The boot flag only sets on success, so a failed boot is retried by
    /// the next create.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::BootFailed` when the host runtime cannot start.
    pub fn create_session(&mut self) -> Result<String, StoreError> {
        if !self.host_booted {
            self.host
                .boot()
                .map_err(|err| StoreError::BootFailed(err.to_string()))?;
            self.host_booted = true;
            tracing::info!("host runtime booted");
        }
        let session = Session::new();
        let id = session.id().to_owned();
        self.sessions.insert(id.clone(), session);
        tracing::debug!(session_id = %id, live = self.sessions.len(), "session created");
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Looks up a session, reporting a typed error on miss.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` when no session has the id.
    pub fn require(&self, id: &str) -> Result<&Session, StoreError> {
        self.sessions.get(id).ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    /// Evaluates a snippet in a session, holding the busy flag for the
    /// duration.
    ///
    /// The flag is cleared on every exit path: normal completion, a snippet
    /// exception (already folded into the `Evaluation`), and evaluator
    /// panics, which are re-raised after the state is restored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown id and
    /// `StoreError::Busy` when the session is already evaluating.
    pub fn evaluate_in(&mut self, id: &str, code: &str) -> Result<Evaluation, StoreError> {
        let host = &*self.host;
        let Some(session) = self.sessions.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_owned()));
        };
        if session.state == SessionState::Busy {
            return Err(StoreError::Busy(id.to_owned()));
        }

        session.state = SessionState::Busy;
        let outcome = catch_unwind(AssertUnwindSafe(|| evaluate(&mut session.repl, code, Some(host))));
        // An interrupt registered mid-evaluation drains through Interrupted
        // back to Idle here.
        session.state = SessionState::Idle;

        match outcome {
            Ok(evaluation) => Ok(evaluation),
            Err(panic) => resume_unwind(panic),
        }
    }

    /// Registers an interrupt: a busy session is marked interrupted.
    ///
    /// Returns whether the session was busy. Interruption is tracked but
    /// not yet enforced; the in-flight evaluation runs to completion.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` when no session has the id.
    pub fn interrupt(&mut self, id: &str) -> Result<bool, StoreError> {
        let Some(session) = self.sessions.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_owned()));
        };
        if session.state == SessionState::Busy {
            session.state = SessionState::Interrupted;
            tracing::debug!(session_id = %id, "interrupt registered");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Destroys every session. Called on shutdown.
    pub fn invalidate_all(&mut self) {
        let dropped = self.sessions.len();
        self.sessions.clear();
        if dropped > 0 {
            tracing::info!(dropped, "sessions invalidated");
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use konsol::NullHost;

    use super::*;

    /// The busy gate is only reachable in production while an evaluation is
    /// in flight, which the single-threaded loop cannot race; the state is
    /// staged directly to observe the refusal.
    #[test]
    fn busy_sessions_refuse_reentrant_evaluation() {
        let mut store = SessionStore::new(Box::new(NullHost));
        let id = store.create_session().unwrap();
        store.sessions.get_mut(&id).unwrap().state = SessionState::Busy;

        match store.evaluate_in(&id, "1") {
            Err(StoreError::Busy(busy_id)) => assert_eq!(busy_id, id),
            other => panic!("expected Busy, got {other:?}"),
        }
    }

    /// An interrupt against a busy session registers the transition.
    #[test]
    fn interrupt_marks_busy_sessions() {
        let mut store = SessionStore::new(Box::new(NullHost));
        let id = store.create_session().unwrap();
        store.sessions.get_mut(&id).unwrap().state = SessionState::Busy;

        let was_busy = store.interrupt(&id).unwrap();
        assert!(was_busy);
        assert_eq!(store.get(&id).unwrap().state(), SessionState::Interrupted);
    }
}
