//! Session orchestration.
//!
//! Composes the deduplicator, classifier, registry, worktree manager, and
//! execution adapter into the end-to-end flow: event → dedup check →
//! classify → route to an existing session or register a new one → drive
//! the adapter's event stream, mirroring events as tracker activities → on
//! the terminal event, release the worktree, unregister, and send the final
//! notification.
//!
//! State machine per session:
//! `new → provisioning → running ⇄ awaiting_input → {complete | error | aborted}`.
//! The terminal path always runs in order: release worktree if bound →
//! unregister → final notification.

pub mod timer;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::adapter::{
    AdapterEvent, ExecutionAdapter, ExecutionInput, ExecutionOutcome, ExecutionRequest,
};
use crate::config::GlobalConfig;
use crate::input::{self, InputReceiver};
use crate::models::event::{ActivityKind, EventSignal, WebhookEvent};
use crate::models::session::{InteractionKind, PendingQuestion, Session, SessionState};
use crate::orchestrator::timer::SessionTimer;
use crate::registry::SessionRegistry;
use crate::tracker::TrackerClient;
use crate::webhook::classify::classify;
use crate::webhook::dedup::Deduplicator;
use crate::worktree::WorktreeManager;
use crate::{AppError, Result};

/// Fixed acknowledgment posted when a session is stopped or times out.
pub const STOP_ACKNOWLEDGMENT: &str = "Session stopped as requested.";

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionOutcome {
    Complete { summary: String },
    Error { message: String },
    Aborted,
}

/// Orchestrates the full session lifecycle.
///
/// Cheaply cloneable; all fields are shared. Constructed explicitly in
/// `main` — there is no global instance.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<GlobalConfig>,
    registry: Arc<SessionRegistry>,
    dedup: Arc<Deduplicator>,
    tracker: Arc<TrackerClient>,
    worktrees: WorktreeManager,
    adapter: Arc<dyn ExecutionAdapter>,
    /// Tracks every spawned session task so shutdown can wait for each
    /// terminal path to run to completion.
    tasks: TaskTracker,
}

impl Orchestrator {
    /// Wire up an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        registry: Arc<SessionRegistry>,
        dedup: Arc<Deduplicator>,
        tracker: Arc<TrackerClient>,
        adapter: Arc<dyn ExecutionAdapter>,
    ) -> Self {
        Self {
            config,
            registry,
            dedup,
            tracker,
            worktrees: WorktreeManager::new(),
            adapter,
            tasks: TaskTracker::new(),
        }
    }

    /// The registry this orchestrator routes through.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Branch name a session for `ticket_id` works on.
    #[must_use]
    pub fn session_branch(ticket_id: &str) -> String {
        format!("agent/{ticket_id}")
    }

    /// Handle one inbound webhook event.
    ///
    /// Duplicate deliveries, malformed payloads, resumes for unknown
    /// sessions, and duplicate registrations are logged and dropped with no
    /// state mutation; none of them is an error to the webhook caller.
    pub async fn handle_event(&self, event: WebhookEvent) {
        let span = info_span!(
            "handle_event",
            delivery_id = event.delivery_id,
            session_id = event.session_id
        );
        async {
            if !self.dedup.check_and_record(&event.delivery_id).await {
                return;
            }

            if event.signal == Some(EventSignal::Stop) {
                self.stop_session(&event.session_id).await;
                return;
            }

            let pending = self.registry.has_pending_question(&event.session_id).await;
            let kind = classify(&event, pending);

            if self.registry.has(&event.session_id).await {
                self.route_to_existing(&event, kind).await;
                return;
            }

            if kind == InteractionKind::Resume {
                warn!(
                    session_id = event.session_id,
                    "resume for unknown session dropped"
                );
                return;
            }

            self.start_session(event, kind).await;
        }
        .instrument(span)
        .await;
    }

    /// Signal an explicit stop for a session.
    ///
    /// The cancellation token fires; the session's driving loop observes it
    /// at its next suspension point and runs the aborted terminal path,
    /// which emits the single stop acknowledgment. Stopping an unknown
    /// session is a no-op (already finished).
    pub async fn stop_session(&self, session_id: &str) {
        if self.registry.abort(session_id).await {
            info!(session_id, "stop requested");
        }
    }

    /// Abort every registered session; used on shutdown.
    pub async fn abort_all(&self) {
        for snapshot in self.registry.snapshots().await {
            self.registry.abort(&snapshot.session_id).await;
        }
    }

    /// Wait for every in-flight session task to finish its terminal path.
    ///
    /// Sessions release their worktree, unregister, and send the final
    /// notification inside the tracked task, so shutdown must not return
    /// before the tracker drains.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn route_to_existing(&self, event: &WebhookEvent, kind: InteractionKind) {
        if kind != InteractionKind::Resume {
            warn!(
                session_id = event.session_id,
                ?kind,
                "event for live session is not a resume — dropped"
            );
            return;
        }

        let Some(answer) = event.comment.as_ref().map(|c| c.body.clone()) else {
            warn!(session_id = event.session_id, "resume without comment body dropped");
            return;
        };

        match self
            .registry
            .resume_with_answer(
                &event.session_id,
                &answer,
                self.config.timeouts.session_window(),
            )
            .await
        {
            Ok(()) => info!(session_id = event.session_id, "session resumed"),
            Err(err) => warn!(session_id = event.session_id, %err, "resume dropped"),
        }
    }

    async fn start_session(&self, event: WebhookEvent, kind: InteractionKind) {
        let session_id = event.session_id.clone();
        let mut session = Session::new(session_id.clone(), event.ticket_id.clone(), kind);
        let cancel = session.cancel.clone();

        let (input_tx, input_rx) = input::channel(build_prompt(&event, kind));
        session.input = Some(input_tx);
        session.timer = Some(
            SessionTimer::new(
                session_id.clone(),
                self.config.timeouts.session_window(),
                cancel.clone(),
            )
            .spawn(),
        );

        // register re-checks presence under its own lock; a concurrent
        // duplicate delivery loses here and is dropped.
        if !self.registry.register(session).await {
            return;
        }

        info!(session_id, ?kind, "session started");
        let orchestrator = self.clone();
        self.tasks.spawn(async move {
            orchestrator.run_session(event, kind, cancel, input_rx).await;
        });
    }

    /// Drive one session from registration to its terminal transition.
    ///
    /// The terminal path in [`finish`](Self::finish) runs for every way the
    /// drive ends — success, failure, stop, or timeout.
    async fn run_session(
        self,
        event: WebhookEvent,
        kind: InteractionKind,
        cancel: CancellationToken,
        input_rx: InputReceiver,
    ) {
        let span = info_span!("session", session_id = event.session_id, ?kind);
        async {
            let outcome = self.drive(&event, kind, cancel, input_rx).await;
            self.finish(&event, kind, outcome).await;
        }
        .instrument(span)
        .await;
    }

    async fn drive(
        &self,
        event: &WebhookEvent,
        kind: InteractionKind,
        cancel: CancellationToken,
        input_rx: InputReceiver,
    ) -> SessionOutcome {
        let session_id = &event.session_id;
        self.notify_status(session_id, "started").await;

        let working_dir = if kind == InteractionKind::Assignment {
            self.registry
                .set_state(session_id, SessionState::Provisioning)
                .await;
            let branch = Self::session_branch(&event.ticket_id);
            match self.provision(session_id, &branch).await {
                Ok(path) => {
                    self.registry
                        .update_worktree(session_id, path.clone())
                        .await;
                    path
                }
                Err(err) => {
                    return SessionOutcome::Error {
                        message: format!("workspace provisioning failed: {err}"),
                    }
                }
            }
        } else {
            // Question sessions run read-only against the primary checkout.
            self.config.primary_checkout()
        };

        // An abort raised during provisioning lands here, before the
        // adapter ever starts.
        if cancel.is_cancelled() {
            return SessionOutcome::Aborted;
        }

        self.registry
            .set_state(session_id, SessionState::Running)
            .await;

        let request = ExecutionRequest {
            session_id: session_id.clone(),
            input: ExecutionInput::Live(input_rx),
            allowed_tools: self.config.adapter.allowed_tools.clone(),
            working_dir,
            cancel: cancel.clone(),
        };

        let events = match self.adapter.execute(request).await {
            Ok(events) => events,
            Err(err) => {
                return SessionOutcome::Error {
                    message: format!("adapter start failed: {err}"),
                }
            }
        };

        self.consume_events(session_id, events, &cancel).await
    }

    /// Consume the adapter's event stream until its terminal event or a
    /// cancellation, mirroring events as tracker activities.
    async fn consume_events(
        &self,
        session_id: &str,
        mut events: mpsc::Receiver<AdapterEvent>,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => return SessionOutcome::Aborted,
                event = events.recv() => event,
            };

            match event {
                None => {
                    return SessionOutcome::Error {
                        message: "adapter stream ended unexpectedly".into(),
                    }
                }
                Some(AdapterEvent::SystemInit { engine }) => {
                    debug!(session_id, engine, "engine initialized");
                }
                Some(AdapterEvent::AssistantText { text }) => {
                    self.notify_activity(session_id, ActivityKind::Thought, &text)
                        .await;
                }
                Some(AdapterEvent::ToolUse { name, input }) => {
                    let body = format!("{name}: {input}");
                    self.notify_activity(session_id, ActivityKind::Action, &body)
                        .await;
                }
                Some(AdapterEvent::Question { id, text }) => {
                    self.park_on_question(session_id, id, text).await;
                }
                Some(AdapterEvent::Completed { outcome }) => {
                    return match outcome {
                        ExecutionOutcome::Success { summary } => {
                            SessionOutcome::Complete { summary }
                        }
                        ExecutionOutcome::Failure { message } => SessionOutcome::Error { message },
                    }
                }
            }
        }
    }

    /// Transition `running → awaiting_input` on a structured question.
    async fn park_on_question(&self, session_id: &str, question_id: String, text: String) {
        let parked = self
            .registry
            .set_awaiting(
                session_id,
                PendingQuestion::new(question_id, text.clone()),
                self.config.timeouts.elicitation_window(),
            )
            .await;
        if !parked {
            warn!(session_id, "question raised but session cannot await input");
            return;
        }

        // The elicitation activity is the signal that flips the ticket to
        // "awaiting input", so it gets one retry before we give up on it.
        for attempt in 0..2_u8 {
            match self
                .tracker
                .create_activity(session_id, ActivityKind::Elicitation, &text)
                .await
            {
                Ok(()) => return,
                Err(err) if attempt == 0 => {
                    warn!(session_id, %err, "elicitation delivery failed — retrying");
                }
                Err(err) => {
                    warn!(session_id, %err, "elicitation delivery failed");
                }
            }
        }
    }

    /// Provision the worktree and run the optional bootstrap command.
    async fn provision(&self, session_id: &str, branch: &str) -> Result<PathBuf> {
        let worktree = self
            .worktrees
            .create(
                &self.config.repos_root,
                &self.config.repo_name,
                branch,
                &self.config.base_branch,
            )
            .await?;

        if let Some(command) = &self.config.bootstrap_command {
            run_bootstrap(session_id, command, &worktree.path).await?;
        }

        Ok(worktree.path)
    }

    /// Terminal path, guaranteed for every session.
    ///
    /// Order: commit/push on success (assignment only) → release worktree →
    /// unregister → final notification. Notification failures are soft.
    async fn finish(&self, event: &WebhookEvent, kind: InteractionKind, outcome: SessionOutcome) {
        let session_id = &event.session_id;
        let branch = Self::session_branch(&event.ticket_id);
        let bound = kind == InteractionKind::Assignment;

        if bound {
            if let SessionOutcome::Complete { .. } = outcome {
                if let Err(err) = self
                    .worktrees
                    .commit_and_push(
                        &self.config.repos_root,
                        &self.config.repo_name,
                        &branch,
                        &format!("Agent changes for {}", event.ticket_id),
                    )
                    .await
                {
                    warn!(session_id, %err, "commit/push failed — changes not published");
                }
            }

            self.worktrees
                .remove(&self.config.repos_root, &self.config.repo_name, &branch)
                .await;
        }

        // Dropping the removed entry closes the input channel and disarms
        // the timer.
        let removed = self.registry.unregister(session_id).await;
        let timed_out = removed
            .as_ref()
            .and_then(|s| s.timer.as_ref())
            .is_some_and(timer::TimerHandle::timed_out);
        drop(removed);

        match &outcome {
            SessionOutcome::Complete { summary } => {
                let body = if summary.is_empty() {
                    "Done."
                } else {
                    summary.as_str()
                };
                self.notify_activity(session_id, ActivityKind::Response, body)
                    .await;
                self.notify_status(session_id, "complete").await;
            }
            SessionOutcome::Error { message } => {
                self.notify_activity(session_id, ActivityKind::Error, message)
                    .await;
                self.notify_status(session_id, "failed").await;
            }
            SessionOutcome::Aborted => {
                self.notify_activity(session_id, ActivityKind::Response, STOP_ACKNOWLEDGMENT)
                    .await;
                self.notify_status(session_id, "stopped").await;
            }
        }

        info!(session_id, ?outcome, timed_out, "session finished");
    }

    /// Best-effort activity creation; failures are logged, never fatal.
    async fn notify_activity(&self, session_id: &str, kind: ActivityKind, body: &str) {
        if let Err(err) = self.tracker.create_activity(session_id, kind, body).await {
            warn!(session_id, kind = kind.as_str(), %err, "activity delivery failed");
        }
    }

    /// Best-effort status update; failures are logged, never fatal.
    async fn notify_status(&self, session_id: &str, status: &str) {
        if let Err(err) = self.tracker.update_status(session_id, status).await {
            warn!(session_id, status, %err, "status update failed");
        }
    }
}

/// Initial prompt pre-enqueued on the session's input channel.
fn build_prompt(event: &WebhookEvent, kind: InteractionKind) -> String {
    match kind {
        InteractionKind::Assignment => format!(
            "You are working on ticket {}. Implement the requested changes, \
             then report a short summary of what you did.",
            event.ticket_id
        ),
        // A resume never starts a session (`handle_event` drops resumes for
        // unknown ids), so only assignment and question reach this point;
        // the resume binding keeps the match total with the question shape.
        InteractionKind::Question | InteractionKind::Resume => {
            let mut prompt = String::new();
            if let Some(previous) = &event.previous_comments {
                for comment in previous {
                    prompt.push_str(&comment.body);
                    prompt.push('\n');
                }
            }
            if let Some(comment) = &event.comment {
                prompt.push_str(&comment.body);
            }
            if prompt.is_empty() {
                prompt = format!("Answer the open question on ticket {}.", event.ticket_id);
            }
            prompt
        }
    }
}

/// Run the configured bootstrap command inside a fresh worktree.
///
/// A non-zero exit is a provisioning failure and therefore session-fatal.
async fn run_bootstrap(session_id: &str, command: &str, working_dir: &std::path::Path) -> Result<()> {
    info!(session_id, command, "running bootstrap command");
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|err| AppError::Io(format!("failed to spawn bootstrap command: {err}")))?;

    if !status.success() {
        return Err(AppError::Io(format!(
            "bootstrap command exited with {status}"
        )));
    }
    Ok(())
}
