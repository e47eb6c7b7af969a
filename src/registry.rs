//! Central authority over in-flight sessions.
//!
//! The registry is the sole source of truth for "does this session exist" —
//! no component re-derives existence independently. It owns each session's
//! cancellation token, worktree binding, input channel sender, pending
//! question, and timeout handle.
//!
//! Every operation is a whole-method critical section under one async
//! mutex: the check and the mutation never straddle a suspension point, so
//! check-then-act sequences are race-free under cooperative scheduling and
//! at most one live entry per `session_id` can exist.
//!
//! Constructed explicitly in `main` and threaded through `AppState`; there
//! is no global instance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::session::{PendingQuestion, Session, SessionSnapshot, SessionState};
use crate::{AppError, Result};

/// Registry of in-flight sessions keyed by `session_id`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session.
    ///
    /// Returns `false` with a warn log if the id is already present; the
    /// existing entry is left untouched (duplicate registration is a
    /// protocol error on the caller's side, not a reason to clobber a live
    /// session).
    pub async fn register(&self, session: Session) -> bool {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.session_id) {
            warn!(
                session_id = session.session_id,
                "duplicate registration attempt ignored"
            );
            return false;
        }
        debug!(session_id = session.session_id, "session registered");
        sessions.insert(session.session_id.clone(), session);
        true
    }

    /// Whether a session with `id` is registered.
    pub async fn has(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    /// Whether the session exists and has an unanswered pending question.
    pub async fn has_pending_question(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(id)
            .is_some_and(|s| s.pending_question.is_some())
    }

    /// The session's cancellation token, if it exists.
    pub async fn cancellation(&self, id: &str) -> Option<CancellationToken> {
        self.sessions.lock().await.get(id).map(|s| s.cancel.clone())
    }

    /// Attach a worktree path once provisioning has produced one.
    ///
    /// The session is already visible (and abortable) at this point.
    /// Returns `false` if the session is gone.
    pub async fn update_worktree(&self, id: &str, path: PathBuf) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(id) {
            Some(session) => {
                session.worktree_path = Some(path);
                true
            }
            None => false,
        }
    }

    /// Record a lifecycle state transition.
    ///
    /// Invalid transitions are logged and refused so a late event cannot
    /// resurrect a terminal session. Returns whether the transition took
    /// effect.
    pub async fn set_state(&self, id: &str, next: SessionState) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else {
            return false;
        };
        if !session.state.can_transition_to(next) {
            warn!(
                session_id = id,
                from = ?session.state,
                to = ?next,
                "invalid state transition refused"
            );
            return false;
        }
        session.state = next;
        true
    }

    /// Park a running session on a structured question.
    ///
    /// Records the pending question, moves to `AwaitingInput`, and re-arms
    /// the timer to the shorter elicitation window. Returns `false` if the
    /// session is gone or not running.
    pub async fn set_awaiting(
        &self,
        id: &str,
        question: PendingQuestion,
        elicitation_window: Duration,
    ) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else {
            return false;
        };
        if !session.state.can_transition_to(SessionState::AwaitingInput) {
            warn!(session_id = id, state = ?session.state, "cannot await input in this state");
            return false;
        }
        session.state = SessionState::AwaitingInput;
        session.pending_question = Some(question);
        if let Some(timer) = &session.timer {
            timer.rearm(elicitation_window);
        }
        true
    }

    /// Deliver an answer to a session paused on a pending question.
    ///
    /// Pushes the answer onto the input channel, clears the pending
    /// question, moves back to `Running`, and re-arms the timer to the full
    /// session window.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if no session with `id` exists.
    /// - [`AppError::Protocol`] if the session has no pending question or
    ///   its input channel is already closed.
    pub async fn resume_with_answer(
        &self,
        id: &str,
        answer: &str,
        session_window: Duration,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else {
            return Err(AppError::NotFound(format!("session {id} not found")));
        };

        let Some(question) = session.pending_question.take() else {
            return Err(AppError::Protocol(format!(
                "resume for session {id} with no pending question"
            )));
        };

        let Some(input) = &session.input else {
            session.pending_question = Some(question);
            return Err(AppError::Protocol(format!(
                "resume for session {id} with closed input channel"
            )));
        };

        if !input.push(answer) {
            session.pending_question = Some(question);
            return Err(AppError::Protocol(format!(
                "resume for session {id}: consumer already gone"
            )));
        }

        debug!(
            session_id = id,
            question_id = question.id,
            "answer delivered to paused session"
        );
        session.state = SessionState::Running;
        if let Some(timer) = &session.timer {
            timer.rearm(session_window);
        }
        Ok(())
    }

    /// Set the session's cancellation signal.
    ///
    /// Returns `false` if the id is absent — the session already finished,
    /// which is not an error. Cancellation is monotonic.
    pub async fn abort(&self, id: &str) -> bool {
        let sessions = self.sessions.lock().await;
        match sessions.get(id) {
            Some(session) => {
                session.cancel.cancel();
                debug!(session_id = id, "session abort signalled");
                true
            }
            None => {
                debug!(session_id = id, "abort for unknown session — already finished");
                false
            }
        }
    }

    /// Remove and return the session entry.
    ///
    /// Always invoked from the guaranteed cleanup path; the returned
    /// session carries the input sender and timer handle so the caller's
    /// drop closes both.
    pub async fn unregister(&self, id: &str) -> Option<Session> {
        let removed = self.sessions.lock().await.remove(id);
        if removed.is_some() {
            debug!(session_id = id, "session unregistered");
        }
        removed
    }

    /// Read-only listing of all registered sessions for observability.
    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .lock()
            .await
            .values()
            .map(Session::snapshot)
            .collect()
    }
}
