#![forbid(unsafe_code)]

//! Webhook-driven agent session dispatcher.
//!
//! Turns at-least-once webhook events from a ticket tracker into bounded,
//! cancellable, resumable agent sessions, each optionally bound to an
//! isolated git worktree.

pub mod adapter;
pub mod config;
pub mod errors;
pub mod input;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod tracker;
pub mod webhook;
pub mod worktree;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
