use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{MeterError, Result};

#[derive(Debug, Default)]
pub(crate) struct CounterCell {
    value: AtomicU64,
}

impl CounterCell {
    pub(crate) fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn add(&self, delta: u64) {
        // saturate instead of wrapping; fetch_update retries on contention
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_add(delta))
            });
    }
}

/// Monotonic counter handle.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    cell: Option<Arc<CounterCell>>,
}

impl Counter {
    pub(crate) fn live(cell: Arc<CounterCell>) -> Self {
        Self { cell: Some(cell) }
    }

    /// Handle that discards every increment.
    pub fn noop() -> Self {
        Self { cell: None }
    }

    pub fn is_noop(&self) -> bool {
        self.cell.is_none()
    }

    /// Add `delta`. Negative deltas are rejected and leave the counter unchanged.
    pub fn increment(&self, delta: i64) -> Result<()> {
        let delta = u64::try_from(delta).map_err(|_| MeterError::InvalidDelta(delta))?;
        if let Some(cell) = &self.cell {
            cell.add(delta);
        }
        Ok(())
    }

    /// Increment by 1.
    pub fn inc(&self) {
        if let Some(cell) = &self.cell {
            cell.add(1);
        }
    }

    /// Current value (0 for a no-op counter).
    pub fn count(&self) -> u64 {
        self.cell.as_ref().map(|c| c.load()).unwrap_or(0)
    }

    /// True when both handles point at the same registered instrument.
    pub fn same_instrument(&self, other: &Counter) -> bool {
        match (&self.cell, &other.cell) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
