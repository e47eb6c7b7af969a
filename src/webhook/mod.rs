//! Webhook intake: duplicate suppression and interaction classification.

pub mod classify;
pub mod dedup;
