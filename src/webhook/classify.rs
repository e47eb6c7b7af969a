//! Interaction classification for inbound webhook events.

use crate::models::event::WebhookEvent;
use crate::models::session::InteractionKind;

/// Body of the system-generated comment the tracker posts when a ticket is
/// delegated to the agent.
///
/// Matching this fixed wording is how a delegation is told apart from a
/// genuine operator question; a tracker-side wording change breaks the
/// distinction.
pub const DELEGATION_TEMPLATE: &str = "This thread is for an agent session with Bot.";

/// Classify an inbound event as assignment, question, or resume.
///
/// Pure and deterministic:
///
/// 1. A live session with a pending question makes any payload a `resume`.
/// 2. Prior thread comments make the event a `question`.
/// 3. A single comment that is not the delegation template is a `question`.
/// 4. Everything else is an `assignment`.
#[must_use]
pub fn classify(event: &WebhookEvent, existing_has_pending_question: bool) -> InteractionKind {
    if existing_has_pending_question {
        return InteractionKind::Resume;
    }

    if event
        .previous_comments
        .as_ref()
        .is_some_and(|comments| !comments.is_empty())
    {
        return InteractionKind::Question;
    }

    if let Some(comment) = &event.comment {
        if comment.body.trim() != DELEGATION_TEMPLATE {
            return InteractionKind::Question;
        }
    }

    InteractionKind::Assignment
}
