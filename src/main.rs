#![forbid(unsafe_code)]

//! `agent-dispatch` — webhook-driven agent session dispatcher binary.
//!
//! Bootstraps configuration, wires the orchestrator to the CLI execution
//! adapter and the tracker client, and serves the webhook/listing surface
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agent_dispatch::adapter::cli::CliAdapter;
use agent_dispatch::config::GlobalConfig;
use agent_dispatch::orchestrator::Orchestrator;
use agent_dispatch::registry::SessionRegistry;
use agent_dispatch::server::{self, AppState};
use agent_dispatch::tracker::TrackerClient;
use agent_dispatch::webhook::dedup::Deduplicator;
use agent_dispatch::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-dispatch", about = "Webhook-driven agent session dispatcher", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format);
    info!("agent-dispatch bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    let port = args.port.unwrap_or(config.http_port);
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Wire collaborators ──────────────────────────────
    let registry = Arc::new(SessionRegistry::new());
    let dedup = Arc::new(Deduplicator::new(config.dedup_retention()));
    let tracker = Arc::new(TrackerClient::new(&config.tracker)?);
    let adapter = Arc::new(CliAdapter::new(config.adapter.clone()));

    let orchestrator = Orchestrator::new(
        Arc::clone(&config),
        registry,
        dedup,
        tracker,
        adapter,
    );

    // ── Serve until interrupted ─────────────────────────
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    let signal_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received — aborting sessions and shutting down");
            signal_orchestrator.abort_all().await;
            signal_shutdown.cancel();
        }
    });

    let state = Arc::new(AppState::new(orchestrator));
    server::serve(state, port, shutdown).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => fmt().with_env_filter(filter).init(),
        LogFormat::Json => fmt().with_env_filter(filter).json().init(),
    }
}
