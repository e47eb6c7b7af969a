//! Execution adapter abstraction.
//!
//! The [`ExecutionAdapter`] trait decouples the orchestrator from the
//! code-authoring engine. An adapter accepts a static prompt or a live
//! input sequence plus a tool allowlist and working directory, and yields a
//! finite, non-restartable sequence of [`AdapterEvent`]s consumed by one
//! driving loop. The sequence terminates with exactly one
//! [`AdapterEvent::Completed`].

pub mod cli;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::input::InputReceiver;
use crate::Result;

/// Terminal outcome of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Engine finished its work.
    Success {
        /// Human-readable summary for the final ticket response.
        summary: String,
    },
    /// Engine failed; the message is surfaced verbatim as an Error activity.
    Failure {
        /// Failure detail.
        message: String,
    },
}

/// Events streamed by an adapter while the engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Engine started and identified itself.
    SystemInit {
        /// Engine name/version string.
        engine: String,
    },
    /// Assistant narration or reasoning text.
    AssistantText {
        /// Text fragment.
        text: String,
    },
    /// The engine invoked a tool.
    ToolUse {
        /// Tool name.
        name: String,
        /// Tool input, engine-defined shape.
        input: serde_json::Value,
    },
    /// The engine raised a structured question and suspended mid-flight.
    Question {
        /// Identifier the eventual answer is keyed to.
        id: String,
        /// Question text.
        text: String,
    },
    /// Terminal event; emitted exactly once, then the stream closes.
    Completed {
        /// Success or failure outcome.
        outcome: ExecutionOutcome,
    },
}

/// Input handed to an execution.
#[derive(Debug)]
pub enum ExecutionInput {
    /// A single fixed prompt.
    Static(String),
    /// A live input sequence; follow-up answers arrive without restarting
    /// the execution.
    Live(InputReceiver),
}

/// One execution call.
#[derive(Debug)]
pub struct ExecutionRequest {
    /// Session the execution belongs to.
    pub session_id: String,
    /// Prompt or live input sequence.
    pub input: ExecutionInput,
    /// Tool names the engine may invoke.
    pub allowed_tools: Vec<String>,
    /// Directory the engine works in; never the ambient process CWD.
    pub working_dir: PathBuf,
    /// Cooperative cancellation signal, observed at suspension points.
    pub cancel: CancellationToken,
}

/// Interface between the orchestrator and the code-authoring engine.
pub trait ExecutionAdapter: Send + Sync {
    /// Start one execution and return its event stream.
    ///
    /// The returned receiver yields events in engine order and closes after
    /// the single [`AdapterEvent::Completed`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Adapter`](crate::AppError::Adapter) if the
    /// execution cannot be started at all; failures after start are
    /// reported through the stream's terminal event.
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<AdapterEvent>>> + Send + '_>>;
}
