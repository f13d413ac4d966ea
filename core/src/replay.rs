// Replay cache — dedup and freshness filtering for received packets

use crate::message::types::now_millis;
use std::collections::HashSet;

/// Freshness window: packets older than this are stale
pub const REPLAY_WINDOW_MILLIS: u64 = 60_000;

/// Time-windowed set of seen `(sender, timestamp)` pairs.
///
/// Entries expire with the freshness window, which also bounds memory:
/// an expired entry can never be re-admitted, so evicting it changes
/// nothing observable.
pub struct ReplayCache {
    window_millis: u64,
    seen: HashSet<(String, u64)>,
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::with_window(REPLAY_WINDOW_MILLIS)
    }

    pub fn with_window(window_millis: u64) -> Self {
        Self {
            window_millis,
            seen: HashSet::new(),
        }
    }

    /// Admit a packet if it is fresh and unseen, recording it if so.
    pub fn admit(&mut self, sender_id: &str, timestamp_millis: u64) -> bool {
        self.admit_at(sender_id, timestamp_millis, now_millis())
    }

    /// Clock-injected admission, used directly by tests.
    pub fn admit_at(&mut self, sender_id: &str, timestamp_millis: u64, now: u64) -> bool {
        self.evict_expired(now);

        if now.saturating_sub(timestamp_millis) >= self.window_millis {
            return false;
        }

        self.seen.insert((sender_id.to_string(), timestamp_millis))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_expired(&mut self, now: u64) {
        let window = self.window_millis;
        self.seen
            .retain(|(_, ts)| now.saturating_sub(*ts) < window);
    }
}
