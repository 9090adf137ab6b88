//! Recently processed inbound events

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Idempotency keys remembered for a bounded window
pub struct RecentEvents {
    seen: DashMap<String, DateTime<Utc>>,
    window: Duration,
}

impl RecentEvents {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    pub fn contains(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.seen
            .get(key)
            .map(|at| now - *at < self.window)
            .unwrap_or(false)
    }

    pub fn remember(&self, key: String, now: DateTime<Utc>) {
        self.seen.insert(key, now);
    }

    /// Forget keys older than the window
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, at| now - *at < self.window);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
