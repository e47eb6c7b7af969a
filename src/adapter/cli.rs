//! Host-CLI execution adapter.
//!
//! Spawns the configured host CLI once per execution with
//! `kill_on_drop(true)`, pumps the input sequence to its stdin as plain
//! lines, and parses newline-delimited JSON events from its stdout through
//! a length-limited [`LinesCodec`].
//!
//! # Known event methods
//!
//! | `event`          | Maps to                          |
//! |------------------|----------------------------------|
//! | `system_init`    | [`AdapterEvent::SystemInit`]     |
//! | `assistant_text` | [`AdapterEvent::AssistantText`]  |
//! | `tool_use`       | [`AdapterEvent::ToolUse`]        |
//! | `question`       | [`AdapterEvent::Question`]       |
//! | `result`         | [`AdapterEvent::Completed`]      |
//! | *(any other)*    | Skipped; logged at `DEBUG`       |

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{
    AdapterEvent, ExecutionAdapter, ExecutionInput, ExecutionOutcome, ExecutionRequest,
};
use crate::config::AdapterConfig;
use crate::input::InputReceiver;
use crate::{AppError, Result};

/// Maximum accepted stdout line length before the codec errors out.
const MAX_LINE_BYTES: usize = 1024 * 1024;
/// Event channel depth between the reader task and the driving loop.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// NDJSON envelope emitted by the host CLI (engine → adapter).
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    /// Event type identifier (e.g., `assistant_text`).
    event: String,
    /// Event-specific payload.
    #[serde(default)]
    params: serde_json::Value,
}

/// Parse a single NDJSON line from the engine stream into an [`AdapterEvent`].
///
/// Returns `Ok(None)` for blank lines and unknown event methods (skipped,
/// logged at `DEBUG`).
///
/// # Errors
///
/// Returns `AppError::Adapter` if the line is not valid JSON or a known
/// event is missing a required field.
pub fn parse_event_line(session_id: &str, line: &str) -> Result<Option<AdapterEvent>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let envelope: EventEnvelope = serde_json::from_str(line)
        .map_err(|err| AppError::Adapter(format!("malformed json: {err}")))?;
    let params = envelope.params;

    let event = match envelope.event.as_str() {
        "system_init" => AdapterEvent::SystemInit {
            engine: str_field(&params, "engine")?,
        },
        "assistant_text" => AdapterEvent::AssistantText {
            text: str_field(&params, "text")?,
        },
        "tool_use" => AdapterEvent::ToolUse {
            name: str_field(&params, "name")?,
            input: params.get("input").cloned().unwrap_or(serde_json::Value::Null),
        },
        "question" => AdapterEvent::Question {
            id: str_field(&params, "id")?,
            text: str_field(&params, "text")?,
        },
        "result" => {
            let success = params
                .get("success")
                .and_then(serde_json::Value::as_bool)
                .ok_or_else(|| AppError::Adapter("missing required field: success".into()))?;
            let outcome = if success {
                ExecutionOutcome::Success {
                    summary: params
                        .get("summary")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                }
            } else {
                ExecutionOutcome::Failure {
                    message: params
                        .get("error")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("engine reported failure without detail")
                        .to_owned(),
                }
            };
            AdapterEvent::Completed { outcome }
        }
        other => {
            debug!(event = other, session_id, "skipping unknown engine event");
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn str_field(params: &serde_json::Value, name: &str) -> Result<String> {
    params
        .get(name)
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| AppError::Adapter(format!("missing required field: {name}")))
}

/// [`ExecutionAdapter`] backed by a host CLI subprocess per execution.
#[derive(Debug, Clone)]
pub struct CliAdapter {
    config: AdapterConfig,
}

impl CliAdapter {
    /// Create an adapter for the configured host CLI.
    #[must_use]
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    fn spawn_child(&self, request: &ExecutionRequest) -> Result<Child> {
        let mut cmd = Command::new(&self.config.host_cli);
        cmd.args(&self.config.host_cli_args);
        if !request.allowed_tools.is_empty() {
            cmd.arg("--allowed-tools")
                .arg(request.allowed_tools.join(","));
        }
        cmd.env("AGENT_SESSION_ID", &request.session_id)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|err| AppError::Adapter(format!("failed to spawn host cli: {err}")))?;

        info!(
            session_id = request.session_id,
            pid = child.id().unwrap_or(0),
            host_cli = self.config.host_cli,
            workdir = %request.working_dir.display(),
            "engine process spawned"
        );
        Ok(child)
    }
}

impl ExecutionAdapter for CliAdapter {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<AdapterEvent>>> + Send + '_>> {
        Box::pin(async move {
            let mut child = self.spawn_child(&request)?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| AppError::Adapter("child stdin not piped".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Adapter("child stdout not piped".into()))?;

            let session_id = request.session_id.clone();
            let cancel = request.cancel.clone();

            tokio::spawn(run_input_pump(
                session_id.clone(),
                request.input,
                stdin,
                cancel.clone(),
            ));

            let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            tokio::spawn(run_reader(session_id, child, stdout, event_tx, cancel));

            Ok(event_rx)
        })
    }
}

/// Feed the input sequence to the engine's stdin, one value per line.
///
/// A static prompt is written once and stdin is closed so the engine sees
/// EOF; a live sequence keeps stdin open until the channel closes or the
/// session is cancelled.
async fn run_input_pump(
    session_id: String,
    input: ExecutionInput,
    mut stdin: ChildStdin,
    cancel: CancellationToken,
) {
    match input {
        ExecutionInput::Static(prompt) => {
            if let Err(err) = write_line(&mut stdin, &prompt).await {
                warn!(session_id, %err, "failed to write prompt to engine");
            }
        }
        ExecutionInput::Live(mut rx) => loop {
            let value = tokio::select! {
                () = cancel.cancelled() => break,
                pulled = pull_next(&mut rx) => match pulled {
                    Some(v) => v,
                    None => break,
                },
            };
            if let Err(err) = write_line(&mut stdin, &value).await {
                warn!(session_id, %err, "failed to write input to engine");
                break;
            }
        },
    }
    // Dropping stdin closes the pipe; a live sequence that ended signals
    // EOF to the engine the same way a static prompt does.
}

async fn pull_next(rx: &mut InputReceiver) -> Option<String> {
    rx.pull().await
}

async fn write_line(stdin: &mut ChildStdin, value: &str) -> std::io::Result<()> {
    stdin.write_all(value.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Read NDJSON lines from the engine's stdout and forward [`AdapterEvent`]s.
///
/// Guarantees exactly one terminal [`AdapterEvent::Completed`]: if the
/// stream ends or the session is cancelled before the engine reports a
/// result, a synthetic failure outcome is emitted.
async fn run_reader(
    session_id: String,
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    event_tx: mpsc::Sender<AdapterEvent>,
    cancel: CancellationToken,
) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let mut completed = false;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!(session_id, "engine reader cancelled");
                break;
            }
            next = lines.next() => next,
        };

        let Some(line) = next else { break };

        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(session_id, %err, "engine stream read error");
                break;
            }
        };

        match parse_event_line(&session_id, &line) {
            Ok(Some(event)) => {
                let terminal = matches!(event, AdapterEvent::Completed { .. });
                if event_tx.send(event).await.is_err() {
                    debug!(session_id, "event consumer gone; stopping reader");
                    break;
                }
                if terminal {
                    completed = true;
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(session_id, %err, "malformed engine event skipped");
            }
        }
    }

    if !completed {
        let _ = event_tx
            .send(AdapterEvent::Completed {
                outcome: ExecutionOutcome::Failure {
                    message: "engine stream ended without a result".into(),
                },
            })
            .await;
    }

    if let Err(err) = child.kill().await {
        debug!(session_id, %err, "engine process already exited");
    }
}
