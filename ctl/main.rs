#![forbid(unsafe_code)]

//! `agent-dispatchctl` — operator CLI companion for `agent-dispatch`.
//!
//! Queries the server's read-only HTTP surface. Observability only; the
//! one control verb (`stop`) goes through the same webhook endpoint the
//! tracker uses.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "agent-dispatchctl",
    about = "Operator CLI for agent-dispatch",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the agent-dispatch HTTP surface.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered sessions.
    Sessions,

    /// Request a stop for a session.
    Stop {
        /// Session identifier.
        session_id: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Cli::parse();
    let base = args.server.trim_end_matches('/').to_owned();

    let result = match &args.command {
        Command::Sessions => list_sessions(&base).await,
        Command::Stop { session_id } => stop_session(&base, session_id).await,
    };

    if let Err(err) = result {
        eprintln!("Failed to reach server: {err}");
        eprintln!("Is agent-dispatch running at {base}?");
        std::process::exit(1);
    }
}

/// Fetch and pretty-print the session listing.
async fn list_sessions(base: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let sessions: serde_json::Value = reqwest::get(format!("{base}/sessions"))
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&sessions)?);
    Ok(())
}

/// Post a synthetic stop event for `session_id`.
async fn stop_session(
    base: &str,
    session_id: &str,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let event = serde_json::json!({
        "delivery_id": uuid::Uuid::new_v4().to_string(),
        "organization_id": "ctl",
        "session_id": session_id,
        "ticket_id": "ctl",
        "signal": "stop",
    });
    let response = reqwest::Client::new()
        .post(format!("{base}/webhook"))
        .json(&event)
        .send()
        .await?
        .error_for_status()?;
    println!("{}", response.status());
    Ok(())
}
