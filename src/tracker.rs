//! Ticket-tracker HTTP client.
//!
//! Covers the two primitives the tracker accepts from this service:
//! activity creation (`Thought`, `Action`, `Response`, `Elicitation`,
//! `Error`) and session status updates. Calls are best-effort at most call
//! sites — the orchestrator logs failures as soft errors rather than
//! failing the session over a notification.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::models::event::ActivityKind;
use crate::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the ticket-tracker API.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl TrackerClient {
    /// Build a client from tracker configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tracker` if the HTTP client cannot be built.
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_token: config.api_token.clone(),
        })
    }

    /// Create an activity on the session's conversation thread.
    ///
    /// An `Elicitation` activity is the one signal that flips the ticket's
    /// externally visible state to "awaiting input".
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tracker` on transport failure or a non-success
    /// status code.
    pub async fn create_activity(
        &self,
        session_id: &str,
        kind: ActivityKind,
        body: &str,
    ) -> Result<()> {
        let url = format!("{}/sessions/{session_id}/activities", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&json!({ "kind": kind.as_str(), "body": body }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Tracker(format!(
                "activity create failed: {} {}",
                response.status(),
                kind.as_str()
            )));
        }

        debug!(session_id, kind = kind.as_str(), "activity created");
        Ok(())
    }

    /// Update the tracker-side session status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tracker` on transport failure or a non-success
    /// status code.
    pub async fn update_status(&self, session_id: &str, status: &str) -> Result<()> {
        let url = format!("{}/sessions/{session_id}/status", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&json!({ "status": status }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Tracker(format!(
                "status update failed: {}",
                response.status()
            )));
        }

        debug!(session_id, status, "session status updated");
        Ok(())
    }
}
