//! Session store behavior: id generation, lazy host boot with retry,
//! lookup errors, evaluation, and teardown.

use std::{cell::RefCell, rc::Rc};

use konsol::{HostError, HostRuntime, NullHost};
use konsol_server::sessions::{SessionState, SessionStore, StoreError};

fn store() -> SessionStore {
    SessionStore::new(Box::new(NullHost))
}

// =============================================================================
// Creation and ids
// =============================================================================

/// Distinct creates produce distinct ids.
#[test]
fn session_ids_are_unique() {
    let mut store = store();
    let first = store.create_session().unwrap();
    let second = store.create_session().unwrap();
    assert_ne!(first, second, "session ids must be unique");
    assert_eq!(store.count(), 2);
}

/// Ids are random 128-bit values in hyphenated hexadecimal form.
#[test]
fn session_ids_are_hyphenated_hex() {
    let mut store = store();
    let id = store.create_session().unwrap();
    assert_eq!(id.len(), 36, "got: {id}");
    assert_eq!(id.chars().filter(|&c| c == '-').count(), 4, "got: {id}");
    assert!(
        id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'),
        "got: {id}"
    );
}

/// New sessions start idle with a creation timestamp.
#[test]
fn new_sessions_are_idle() {
    let mut store = store();
    let id = store.create_session().unwrap();
    let session = store.get(&id).expect("session should exist");
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.created_at().elapsed().is_ok(), "created_at should be in the past");
}

// =============================================================================
// Host boot
// =============================================================================

/// Counts boots; fails the first attempt to exercise the retry path.
struct FlakyHost {
    boots: Rc<RefCell<u32>>,
}

impl HostRuntime for FlakyHost {
    fn boot(&mut self) -> Result<(), HostError> {
        let mut boots = self.boots.borrow_mut();
        *boots += 1;
        if *boots == 1 {
            Err(HostError::new("database is not reachable"))
        } else {
            Ok(())
        }
    }
}

/// A failed boot surfaces as BootFailed, leaves the flag unset so the next
/// create retries, and a successful boot happens exactly once.
#[test]
fn host_boot_is_lazy_gated_and_retried() {
    let boots = Rc::new(RefCell::new(0));
    let mut store = SessionStore::new(Box::new(FlakyHost { boots: Rc::clone(&boots) }));
    assert_eq!(*boots.borrow(), 0, "construction must not boot the host");

    match store.create_session() {
        Err(StoreError::BootFailed(message)) => {
            assert!(message.contains("database is not reachable"), "got: {message}");
        }
        other => panic!("expected BootFailed, got {other:?}"),
    }
    assert_eq!(store.count(), 0, "no session on failed boot");

    let id = store.create_session().expect("retry should succeed");
    assert_eq!(*boots.borrow(), 2, "boot should have been retried");
    assert!(store.get(&id).is_some());

    store.create_session().expect("later creates reuse the booted host");
    assert_eq!(*boots.borrow(), 2, "boot happens at most once after success");
}

// =============================================================================
// Lookup and evaluation
// =============================================================================

/// `require` reports a typed not-found error.
#[test]
fn require_misses_are_typed() {
    let store = store();
    match store.require("00000000-0000-0000-0000-000000000000") {
        Err(StoreError::NotFound(id)) => assert_eq!(id, "00000000-0000-0000-0000-000000000000"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

/// Evaluation against an unknown id is a typed not-found error.
#[test]
fn evaluate_in_unknown_session_fails() {
    let mut store = store();
    match store.evaluate_in("nope", "1 + 1") {
        Err(StoreError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

/// Evaluation state persists per session and sessions are isolated.
#[test]
fn sessions_are_isolated() {
    let mut store = store();
    let a = store.create_session().unwrap();
    let b = store.create_session().unwrap();

    store.evaluate_in(&a, "x = 1").unwrap();
    let in_a = store.evaluate_in(&a, "x").unwrap();
    assert_eq!(in_a.value, "1");

    let in_b = store.evaluate_in(&b, "x").unwrap();
    let exc = in_b.exception.expect("x should be undefined in session b");
    assert_eq!(exc.class_name, "NameError");
}

/// The busy flag is released after evaluation, raise or not.
#[test]
fn sessions_return_to_idle_after_evaluation() {
    let mut store = store();
    let id = store.create_session().unwrap();

    store.evaluate_in(&id, "1 + 1").unwrap();
    assert_eq!(store.get(&id).unwrap().state(), SessionState::Idle);

    store.evaluate_in(&id, "raise \"boom\"").unwrap();
    assert_eq!(store.get(&id).unwrap().state(), SessionState::Idle);
}

// =============================================================================
// Interrupt and teardown
// =============================================================================

/// Interrupting an idle session is a tracked no-op.
#[test]
fn interrupt_on_idle_session_is_noop() {
    let mut store = store();
    let id = store.create_session().unwrap();
    let was_busy = store.interrupt(&id).unwrap();
    assert!(!was_busy);
    assert_eq!(store.get(&id).unwrap().state(), SessionState::Idle);
}

/// Interrupting an unknown session is a typed error.
#[test]
fn interrupt_unknown_session_fails() {
    let mut store = store();
    match store.interrupt("nope") {
        Err(StoreError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

/// `invalidate_all` clears the registry.
#[test]
fn invalidate_all_destroys_sessions() {
    let mut store = store();
    let id = store.create_session().unwrap();
    store.create_session().unwrap();
    store.invalidate_all();
    assert_eq!(store.count(), 0);
    assert!(store.get(&id).is_none());
    assert!(matches!(store.evaluate_in(&id, "1"), Err(StoreError::NotFound(_))));
}
