//! Single-producer/single-consumer input channel for paused sessions.
//!
//! A session's execution adapter consumes an [`InputReceiver`] as its live
//! input sequence so a single long-lived execution can receive a follow-up
//! answer without restarting. The channel starts with the original prompt
//! pre-enqueued; the registry holds the [`InputSender`] and pushes answers
//! as `resume` events arrive.

use tokio::sync::mpsc;
use tracing::debug;

/// Producer half of a session input channel.
///
/// `push` is synchronous and never suspends, so the registry can deliver an
/// answer while holding its lock without introducing a suspension point.
#[derive(Debug)]
pub struct InputSender {
    tx: mpsc::UnboundedSender<String>,
}

impl InputSender {
    /// Append a value to the queue, waking a suspended consumer if one is
    /// waiting.
    ///
    /// Returns `false` if the consumer side is gone (session finished); the
    /// value is dropped in that case.
    #[must_use = "a false return means the value was dropped"]
    pub fn push(&self, value: impl Into<String>) -> bool {
        let ok = self.tx.send(value.into()).is_ok();
        if !ok {
            debug!("input push on closed channel — value dropped");
        }
        ok
    }
}

/// Consumer half of a session input channel.
///
/// At most one `pull` may be outstanding at a time — concurrent pulls are
/// not supported. Once the sender is dropped and the queue drains, the
/// sequence is finished and cannot restart.
#[derive(Debug)]
pub struct InputReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl InputReceiver {
    /// Return the next queued value, or suspend until one arrives.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn pull(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Non-suspending poll used by synchronous call sites in tests.
    pub fn try_pull(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Create an input channel with `initial_prompt` pre-enqueued.
#[must_use]
pub fn channel(initial_prompt: impl Into<String>) -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    // The send cannot fail here: the receiver is alive in this scope.
    let _ = tx.send(initial_prompt.into());
    (InputSender { tx }, InputReceiver { rx })
}
