//! Step (delta) bookkeeping for destinations that expect per-interval values.
//!
//! Deltas are computed against the last *committed* value, and committed only
//! after a successful send, so a retried or failed flush re-sends the same
//! increment next time. Delivery is at-least-once: a request the destination
//! accepted but whose response never arrived (timeout, dropped connection)
//! is sent again.
//!
//! Counts only move forward and their deltas are floored at zero. Summary
//! sums may shrink, so their deltas keep their sign.

use dashmap::DashMap;

use meterhub_core::MeterId;

type Key = (MeterId, &'static str);

#[derive(Debug, Default)]
pub struct StepDeltas {
    committed: DashMap<Key, f64>,
}

/// Values observed during one encode, waiting for a successful send.
#[derive(Debug, Default)]
pub struct PendingCommit {
    values: Vec<(Key, f64)>,
}

impl StepDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta of a monotonic value (counter, sample count); never negative.
    pub fn delta(&self, pending: &mut PendingCommit, id: &MeterId, field: &'static str, current: f64) -> f64 {
        self.signed_delta(pending, id, field, current).max(0.0)
    }

    /// Delta of a value that may decrease (summary sum).
    pub fn signed_delta(&self, pending: &mut PendingCommit, id: &MeterId, field: &'static str, current: f64) -> f64 {
        let key = (id.clone(), field);
        let prev = self.committed.get(&key).map(|v| *v.value()).unwrap_or(0.0);
        pending.values.push((key, current));
        current - prev
    }

    pub fn commit(&self, pending: PendingCommit) {
        for (k, v) in pending.values {
            self.committed.insert(k, v);
        }
    }
}
