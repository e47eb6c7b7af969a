//! Session entity and lifecycle state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::input::InputSender;
use crate::orchestrator::timer::TimerHandle;

/// How an inbound event relates to a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// The ticket was delegated to the agent; a worktree is provisioned.
    Assignment,
    /// A read-only question against the existing checkout.
    Question,
    /// An answer to a pending question on a live session.
    Resume,
}

/// Lifecycle state for a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered but not yet started.
    New,
    /// Worktree creation and environment bootstrap in progress.
    Provisioning,
    /// Execution adapter is streaming events.
    Running,
    /// Paused on a structured question, waiting for an operator answer.
    AwaitingInput,
    /// Adapter finished successfully.
    Complete,
    /// Provisioning or adapter failure.
    Error,
    /// Explicit stop or timeout.
    Aborted,
}

impl SessionState {
    /// Whether this state ends the session.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Aborted)
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Any non-terminal state may transition to `Aborted` (explicit stop or
    /// timeout) or `Error`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::New => false,
            Self::Provisioning => self == Self::New,
            Self::Running => matches!(self, Self::New | Self::Provisioning | Self::AwaitingInput),
            Self::AwaitingInput | Self::Complete => self == Self::Running,
            Self::Error | Self::Aborted => true,
        }
    }
}

/// The last structured question raised mid-execution.
///
/// Retained only until answered or timed out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PendingQuestion {
    /// Identifier the answer is keyed to.
    pub id: String,
    /// Question text shown on the ticket.
    pub text: String,
    /// When the question was raised.
    pub asked_at: DateTime<Utc>,
}

impl PendingQuestion {
    /// Construct a pending question raised now.
    #[must_use]
    pub fn new(id: String, text: String) -> Self {
        Self {
            id,
            text,
            asked_at: Utc::now(),
        }
    }
}

/// One in-flight unit of work, exclusively owned by the session registry.
///
/// Created on the first event for a `session_id`, destroyed on the terminal
/// transition.
#[derive(Debug)]
pub struct Session {
    /// Conversation-thread session identifier.
    pub session_id: String,
    /// Ticket the session works on.
    pub ticket_id: String,
    /// How the session was started.
    pub kind: InteractionKind,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
    /// Bound worktree, if the session modifies code.
    pub worktree_path: Option<PathBuf>,
    /// Cancellation signal; cancelled on stop or timeout, monotonic.
    pub cancel: CancellationToken,
    /// Producer half of the input channel, absent once closed.
    pub input: Option<InputSender>,
    /// Last structured question raised mid-execution.
    pub pending_question: Option<PendingQuestion>,
    /// Timeout task handle; dropping it disarms the timer.
    pub timer: Option<TimerHandle>,
}

impl Session {
    /// Construct a fresh session in the `New` state with its own
    /// cancellation token.
    #[must_use]
    pub fn new(session_id: String, ticket_id: String, kind: InteractionKind) -> Self {
        Self {
            session_id,
            ticket_id,
            kind,
            state: SessionState::New,
            started_at: Utc::now(),
            worktree_path: None,
            cancel: CancellationToken::new(),
            input: None,
            pending_question: None,
            timer: None,
        }
    }

    /// Read-only view for the operator listing.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            ticket_id: self.ticket_id.clone(),
            kind: self.kind,
            state: self.state,
            started_at: self.started_at,
            worktree_path: self.worktree_path.clone(),
        }
    }
}

/// Serializable read-only view of a registered session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionSnapshot {
    /// Conversation-thread session identifier.
    pub session_id: String,
    /// Ticket the session works on.
    pub ticket_id: String,
    /// How the session was started.
    pub kind: InteractionKind,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
    /// Bound worktree, if any.
    pub worktree_path: Option<PathBuf>,
}
