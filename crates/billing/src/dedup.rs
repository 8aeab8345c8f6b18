//! Webhook event deduplication
//!
//! Polar retries deliveries and can emit both a `subscription.updated` and a
//! `subscription.canceled` describing the same immediate cancellation. This
//! cache suppresses re-applying a state transition: a seen-key set for
//! ordinary events plus an outcome map for immediate cancellations, where the
//! key deliberately omits any timestamp so that only the first of the racing
//! events wins.
//!
//! The cache is in-process, non-durable, and not shared across instances.
//! Check-then-insert is atomic within one process (single mutex) but two
//! instances can still each apply the same event; the transport gives no
//! ordering guarantees either way, so handlers are written to converge.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use time::OffsetDateTime;

/// Outcome tag recorded for a processed immediate cancellation.
pub const IMMEDIATE_CANCEL_PROCESSED: &str = "immediate-cancel-processed";

#[derive(Default)]
struct DedupState {
    seen_events: HashSet<String>,
    immediate_cancellations: HashMap<String, &'static str>,
}

/// Process-wide, time-bounded event key cache.
#[derive(Default)]
pub struct EventDedupCache {
    state: Mutex<DedupState>,
}

impl EventDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for an immediate cancellation. No timestamp or version on
    /// purpose: the first of {updated, canceled} for this cancellation wins.
    pub fn immediate_cancel_key(subscription_id: &str) -> String {
        format!("immediate-cancel-{subscription_id}")
    }

    /// Key for an ordinary event application.
    pub fn event_key(
        kind: &str,
        subscription_id: &str,
        modified_at: Option<OffsetDateTime>,
    ) -> String {
        let stamp = modified_at
            .unwrap_or_else(OffsetDateTime::now_utc)
            .unix_timestamp();
        format!("{kind}-{subscription_id}-{stamp}")
    }

    /// Claim an ordinary event key. Returns `true` if this is the first
    /// sighting; the key is inserted before the caller mutates any state.
    pub fn claim(&self, key: &str) -> bool {
        #[allow(clippy::unwrap_used)] // mutex poisoning is unrecoverable here
        let mut state = self.state.lock().unwrap();
        state.seen_events.insert(key.to_string())
    }

    /// Claim an immediate-cancellation key across both key spaces. Returns
    /// `true` if neither structure has seen it.
    pub fn claim_immediate_cancellation(&self, subscription_id: &str) -> bool {
        let key = Self::immediate_cancel_key(subscription_id);
        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();
        if state.seen_events.contains(&key) || state.immediate_cancellations.contains_key(&key) {
            return false;
        }
        state.seen_events.insert(key.clone());
        state
            .immediate_cancellations
            .insert(key, IMMEDIATE_CANCEL_PROCESSED);
        true
    }

    /// Wholesale clear, run on a fixed wall-clock interval. Growth
    /// mitigation only; entries are never individually expired.
    pub fn clear(&self) {
        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();
        let dropped = state.seen_events.len() + state.immediate_cancellations.len();
        state.seen_events.clear();
        state.immediate_cancellations.clear();
        tracing::debug!(dropped_keys = dropped, "Cleared webhook dedup cache");
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        let state = self.state.lock().unwrap();
        state.seen_events.len() + state.immediate_cancellations.len()
    }
}
