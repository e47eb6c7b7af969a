//! HTTP surface: webhook ingestion and the operator session listing.
//!
//! `POST /webhook` accepts a tracker event and returns `202 Accepted`
//! immediately; handling runs on a tracked background task. Malformed
//! bodies are rejected by the JSON extractor (protocol error, dropped).
//! `GET /sessions` exposes the read-only registry listing — observability,
//! not control.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::models::event::WebhookEvent;
use crate::models::session::SessionSnapshot;
use crate::orchestrator::Orchestrator;
use crate::{AppError, Result};

/// Shared state for the HTTP surface.
pub struct AppState {
    /// The session orchestrator all events route through.
    pub orchestrator: Orchestrator,
    /// Tracks spawned event-handling tasks for graceful shutdown.
    pub tasks: TaskTracker,
}

impl AppState {
    /// Build state around an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            tasks: TaskTracker::new(),
        }
    }
}

/// Build the axum router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(post_webhook))
        .route("/sessions", get(get_sessions))
        .with_state(state)
}

/// Bind and serve until `shutdown` fires, then drain in-flight work.
///
/// Drain order matters: webhook handlers first (they may still spawn
/// sessions), then the orchestrator's session tasks so every terminal
/// path — worktree release, unregister, final notification — finishes
/// before the process exits.
///
/// # Errors
///
/// Returns `AppError::Io` if the port cannot be bound or the server fails.
pub async fn serve(state: Arc<AppState>, port: u16, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|err| AppError::Io(format!("failed to bind port {port}: {err}")))?;
    info!(port, "http surface listening");

    let tasks = state.tasks.clone();
    let orchestrator = state.orchestrator.clone();
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("http server failed: {err}")))?;

    tasks.close();
    tasks.wait().await;
    orchestrator.drain().await;
    Ok(())
}

async fn post_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<WebhookEvent>,
) -> StatusCode {
    let orchestrator = state.orchestrator.clone();
    state.tasks.spawn(async move {
        orchestrator.handle_event(event).await;
    });
    StatusCode::ACCEPTED
}

async fn get_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSnapshot>> {
    Json(state.orchestrator.registry().snapshots().await)
}
