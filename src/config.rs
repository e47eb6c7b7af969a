//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Ticket-tracker connectivity settings.
///
/// The API token is loaded at runtime via OS keychain or environment
/// variable, never from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Base URL of the tracker API (e.g., `https://tracker.example.com/api`).
    pub base_url: String,
    /// Bearer token for the tracker API (populated at runtime).
    #[serde(skip)]
    pub api_token: String,
}

/// Configurable timeout values (seconds) for session execution.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Overall session timeout.
    #[serde(default = "default_session_seconds")]
    pub session_seconds: u64,
    /// Shorter timeout armed while a session is awaiting operator input.
    #[serde(default = "default_elicitation_seconds")]
    pub elicitation_seconds: u64,
}

impl TimeoutConfig {
    /// Overall session window as a [`Duration`].
    #[must_use]
    pub fn session_window(&self) -> Duration {
        Duration::from_secs(self.session_seconds)
    }

    /// Awaiting-input window as a [`Duration`].
    #[must_use]
    pub fn elicitation_window(&self) -> Duration {
        Duration::from_secs(self.elicitation_seconds)
    }
}

fn default_session_seconds() -> u64 {
    3600
}

fn default_elicitation_seconds() -> u64 {
    900
}

/// Execution adapter (host CLI) settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AdapterConfig {
    /// Host CLI binary that runs the code-authoring engine.
    pub host_cli: String,
    /// Default arguments for the host CLI.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Tool names the engine is allowed to invoke.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_dedup_retention_seconds() -> u64 {
    300
}

fn default_http_port() -> u16 {
    8080
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory containing the primary repository checkout and worktrees.
    pub repos_root: PathBuf,
    /// Name of the repository this service dispatches sessions for.
    pub repo_name: String,
    /// Branch new session branches are cut from.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Optional shell command run inside a freshly created worktree before
    /// the adapter starts (dependency bootstrap).
    #[serde(default)]
    pub bootstrap_command: Option<String>,
    /// Seconds a webhook delivery id is remembered for dedup purposes.
    #[serde(default = "default_dedup_retention_seconds")]
    pub dedup_retention_seconds: u64,
    /// HTTP port for the webhook and session-listing surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Ticket-tracker connectivity settings.
    pub tracker: TrackerConfig,
    /// Execution adapter settings.
    pub adapter: AdapterConfig,
    /// Timeout configuration for session execution.
    #[serde(default = "default_timeouts")]
    pub timeouts: TimeoutConfig,
}

fn default_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        session_seconds: default_session_seconds(),
        elicitation_seconds: default_elicitation_seconds(),
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the tracker API token from OS keychain with env-var fallback.
    ///
    /// Tries the `agent-dispatch` keyring service first, then falls back to
    /// the `TRACKER_API_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provides
    /// the token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.tracker.api_token = load_credential("tracker_api_token", "TRACKER_API_TOKEN").await?;
        Ok(())
    }

    /// Dedup retention window as a [`Duration`].
    #[must_use]
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_seconds)
    }

    /// Path to the primary (read-only) checkout of the configured repository.
    #[must_use]
    pub fn primary_checkout(&self) -> PathBuf {
        self.repos_root.join(&self.repo_name)
    }

    fn validate(&mut self) -> Result<()> {
        if self.repo_name.is_empty() {
            return Err(AppError::Config("repo_name must not be empty".into()));
        }

        if self.timeouts.elicitation_seconds >= self.timeouts.session_seconds {
            return Err(AppError::Config(
                "elicitation_seconds must be shorter than session_seconds".into(),
            ));
        }

        if self.dedup_retention_seconds == 0 {
            return Err(AppError::Config(
                "dedup_retention_seconds must be greater than zero".into(),
            ));
        }

        let canonical_root = self
            .repos_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("repos_root invalid: {err}")))?;
        self.repos_root = canonical_root;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new("agent-dispatch", &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
