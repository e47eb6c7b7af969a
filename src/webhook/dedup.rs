//! Time-windowed webhook delivery deduplication.
//!
//! The tracker delivers events at least once. Every delivery carries a GUID;
//! this set remembers GUIDs for a retention window and is consulted before
//! any side effect. Entries are pruned lazily on insert, so memory is
//! bounded by time-based eviction only.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Time-windowed set of recently seen delivery ids.
#[derive(Debug)]
pub struct Deduplicator {
    retention: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Deduplicator {
    /// Create a deduplicator with the given retention window.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `id` was recorded within the retention window.
    pub async fn seen(&self, id: &str) -> bool {
        let seen = self.seen.lock().await;
        seen.get(id)
            .is_some_and(|at| at.elapsed() < self.retention)
    }

    /// Record `id` as seen now, pruning expired entries.
    pub async fn record(&self, id: &str) {
        let mut seen = self.seen.lock().await;
        let retention = self.retention;
        seen.retain(|_, at| at.elapsed() < retention);
        seen.insert(id.to_owned(), Instant::now());
    }

    /// Atomically check and record `id` under a single lock acquisition.
    ///
    /// Returns `true` if the id is new (recorded, caller should process the
    /// event) or `false` if it is a duplicate within the retention window.
    pub async fn check_and_record(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().await;
        let retention = self.retention;
        seen.retain(|_, at| at.elapsed() < retention);
        if seen.contains_key(id) {
            debug!(delivery_id = id, "duplicate delivery suppressed");
            return false;
        }
        seen.insert(id.to_owned(), Instant::now());
        true
    }
}
