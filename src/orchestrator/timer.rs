//! Re-armable session timeout task.
//!
//! Each session owns one [`SessionTimer`]. On expiry it cancels the
//! session's cancellation token, so a timeout executes exactly the same
//! path as an explicit stop. The timer is re-armed on every transition that
//! changes the applicable window: the overall session window while running,
//! the shorter elicitation window while awaiting input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

/// Builder for a per-session timeout task.
///
/// Call [`spawn`](Self::spawn) to start the background timer.
pub struct SessionTimer {
    session_id: String,
    window: Duration,
    session_cancel: CancellationToken,
}

impl SessionTimer {
    /// Construct a new timer (does not start the task yet).
    ///
    /// `session_cancel` is the session's own cancellation token; it is
    /// cancelled when the timer expires.
    #[must_use]
    pub fn new(session_id: String, window: Duration, session_cancel: CancellationToken) -> Self {
        Self {
            session_id,
            window,
            session_cancel,
        }
    }

    /// Spawn the background timer task and return a handle for re-arming it.
    #[must_use]
    pub fn spawn(self) -> TimerHandle {
        let (rearm_tx, rearm_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let expired = Arc::new(AtomicBool::new(false));

        tokio::spawn(
            Self::run(
                self.session_id.clone(),
                self.window,
                self.session_cancel,
                stop.clone(),
                rearm_rx,
                Arc::clone(&expired),
            )
            .instrument(info_span!("session_timer")),
        );

        TimerHandle {
            session_id: self.session_id,
            rearm_tx,
            stop,
            expired,
        }
    }

    async fn run(
        session_id: String,
        mut window: Duration,
        session_cancel: CancellationToken,
        stop: CancellationToken,
        mut rearm_rx: mpsc::UnboundedReceiver<Duration>,
        expired: Arc<AtomicBool>,
    ) {
        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    debug!(session_id, "session timer stopped");
                    return;
                }
                () = session_cancel.cancelled() => {
                    // Session is already going down; nothing left to time.
                    debug!(session_id, "session timer released by cancellation");
                    return;
                }
                rearmed = rearm_rx.recv() => {
                    match rearmed {
                        Some(next) => {
                            debug!(session_id, window_secs = next.as_secs(), "session timer re-armed");
                            window = next;
                        }
                        None => return,
                    }
                }
                () = tokio::time::sleep(window) => {
                    warn!(session_id, window_secs = window.as_secs(), "session timed out");
                    expired.store(true, Ordering::SeqCst);
                    session_cancel.cancel();
                    return;
                }
            }
        }
    }
}

/// Handle returned from [`SessionTimer::spawn`] for controlling the task.
///
/// Dropping the handle stops the timer without cancelling the session.
#[derive(Debug)]
pub struct TimerHandle {
    session_id: String,
    rearm_tx: mpsc::UnboundedSender<Duration>,
    stop: CancellationToken,
    expired: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Restart the countdown with a new window.
    pub fn rearm(&self, window: Duration) {
        let _ = self.rearm_tx.send(window);
    }

    /// Whether the timer has fired.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// The session this timer belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
