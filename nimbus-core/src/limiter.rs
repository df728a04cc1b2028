//! Minimum spacing between outbound requests, per provider key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive `acquire` calls for the
/// same provider key.
///
/// Each key owns its own slot (last-call instant behind an async mutex), so
/// concurrent callers on one key queue serially in FIFO order while other
/// keys proceed untouched. The outer map lock is held only long enough to
/// look up or create a slot, never across a sleep.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    slots: Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, slots: Mutex::new(HashMap::new()) }
    }

    /// Block until at least `min_interval` has elapsed since the last
    /// `acquire` for `provider_key`, then record the new call time.
    pub async fn acquire(&self, provider_key: &str) {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(provider_key.to_string()).or_default())
        };

        let mut last_call = slot.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(key = provider_key, ?wait, "rate limiting: spacing request");
                tokio::time::sleep(wait).await;
            }
        }

        *last_call = Some(Instant::now());
    }
}
