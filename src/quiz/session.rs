use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::quiz::bank::CollectionKind;
use crate::quiz::timer::Countdown;
use crate::quiz::{MessageRef, PlayerId, Question};

/// Source for epoch tokens. Process-wide and monotonic, so a token armed by
/// a discarded session can never match a fresh session for the same user.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(0);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// Where one run currently is. `Completed` has no variant: completion clears
/// the session from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingAnswer,
    ShowingFeedback,
    Paused,
}

/// Per-user quiz progress. All fields are mutated by the engine while it
/// holds the session's lock; the timer slot and epoch are kept private so
/// the one-live-timer invariant cannot be bypassed.
pub struct Session {
    pub level: String,
    pub kind: CollectionKind,
    pub display_name: String,
    pub question_index: usize,
    pub correct_answers: u32,
    pub total: usize,
    /// Snapshot of the question on screen, not re-derived by index.
    pub current: Option<Question>,
    pub phase: Phase,
    pub question_msg: Option<MessageRef>,
    pub timer_msg: Option<MessageRef>,
    epoch: u64,
    timer: Option<Countdown>,
}

impl Session {
    pub fn new(level: &str, kind: CollectionKind, display_name: &str, total: usize) -> Self {
        Self {
            level: level.to_string(),
            kind,
            display_name: display_name.to_string(),
            question_index: 0,
            correct_answers: 0,
            total,
            current: None,
            phase: Phase::AwaitingAnswer,
            question_msg: None,
            timer_msg: None,
            epoch: next_epoch(),
            timer: None,
        }
    }

    /// Token scheduled continuations must present to be applied.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Cancels whatever continuation is armed and invalidates its token.
    /// Returns the fresh token for the caller to arm the next one with.
    pub fn disarm(&mut self) -> u64 {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.epoch = next_epoch();
        self.epoch
    }

    /// Hands the single continuation slot to a new countdown; the previous
    /// occupant, if any, is cancelled.
    pub fn arm(&mut self, countdown: Countdown) {
        if let Some(old) = self.timer.replace(countdown) {
            old.cancel();
        }
    }
}

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Active sessions keyed by user. An explicit store with a defined
/// lifecycle; the engine is handed one instead of reaching for a global.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<PlayerId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any existing session for the user. Dropping the old session
    /// aborts its scheduled work.
    pub fn create(&self, user: PlayerId, session: Session) -> SessionHandle {
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        self.inner.lock().unwrap().insert(user, handle.clone());
        handle
    }

    pub fn get(&self, user: PlayerId) -> Option<SessionHandle> {
        self.inner.lock().unwrap().get(&user).cloned()
    }

    pub fn remove(&self, user: PlayerId) {
        self.inner.lock().unwrap().remove(&user);
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
