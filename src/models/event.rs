//! Inbound webhook payloads and outbound activity kinds.

use serde::{Deserialize, Serialize};

/// A single comment on the ticket conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Comment {
    /// Tracker-side comment identifier.
    pub id: String,
    /// Raw comment body.
    pub body: String,
}

/// Control signal carried by an inbound event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSignal {
    /// Operator requested the session to stop.
    Stop,
}

/// Inbound webhook event from the ticket tracker.
///
/// Delivery is at-least-once; `delivery_id` is the tracker's per-delivery
/// GUID and is the dedup key, not a domain identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WebhookEvent {
    /// Per-delivery GUID used for duplicate suppression.
    pub delivery_id: String,
    /// Owning tracker organization.
    pub organization_id: String,
    /// Conversation-thread session identifier.
    pub session_id: String,
    /// Ticket the session works on.
    pub ticket_id: String,
    /// Prior thread comments, present when the event is a follow-up.
    #[serde(default)]
    pub previous_comments: Option<Vec<Comment>>,
    /// The comment that triggered this event, if any.
    #[serde(default)]
    pub comment: Option<Comment>,
    /// Control signal, if any.
    #[serde(default)]
    pub signal: Option<EventSignal>,
    /// Tracker-side session status at delivery time, if any.
    #[serde(default)]
    pub status: Option<String>,
}

/// Externally visible activity kinds mirrored to the tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Assistant reasoning or narration.
    Thought,
    /// A tool invocation performed by the engine.
    Action,
    /// Final answer or summary shown on the ticket.
    Response,
    /// Structured question — flips the ticket UI to "awaiting input".
    Elicitation,
    /// Error surfaced to the ticket.
    Error,
}

impl ActivityKind {
    /// Wire name of the activity kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::Action => "action",
            Self::Response => "response",
            Self::Elicitation => "elicitation",
            Self::Error => "error",
        }
    }
}
