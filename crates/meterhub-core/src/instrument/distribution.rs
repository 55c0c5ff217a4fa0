//! Shared state behind timers and summaries.
//!
//! Cumulative count/total feed `_count`/`_sum`; max and percentiles come from
//! the decaying ring window. One lock per instrument covers rotate+insert.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::histogram::{HistogramSnapshot, RingHistogram};

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSample {
    /// Samples recorded since creation.
    pub count: u64,
    /// Sum of all samples since creation.
    pub total: f64,
    /// Max over the live window.
    pub max: f64,
    /// `(p, value)` over the live window.
    pub percentiles: Vec<(f64, f64)>,
}

#[derive(Debug)]
struct DistState {
    ring: RingHistogram,
    count: u64,
    total: f64,
}

#[derive(Debug)]
pub(crate) struct DistributionCell {
    state: Mutex<DistState>,
    percentiles: Arc<[f64]>,
    clock: Arc<dyn Clock>,
}

impl DistributionCell {
    pub(crate) fn new(
        buffer_length: usize,
        expiry: Duration,
        percentiles: Arc<[f64]>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ring = RingHistogram::new(buffer_length, expiry, clock.now());
        Self {
            state: Mutex::new(DistState {
                ring,
                count: 0,
                total: 0.0,
            }),
            percentiles,
            clock,
        }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn record(&self, v: f64) {
        if !v.is_finite() {
            return;
        }
        let now = self.clock.now();
        let mut st = self.state.lock();
        st.ring.record(v, now);
        st.count = st.count.saturating_add(1);
        st.total += v;
    }

    pub(crate) fn window(&self) -> HistogramSnapshot {
        let now = self.clock.now();
        self.state.lock().ring.snapshot(&self.percentiles, now)
    }

    pub(crate) fn sample(&self) -> DistributionSample {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let w = st.ring.snapshot(&self.percentiles, now);
        DistributionSample {
            count: st.count,
            total: st.total,
            max: w.max,
            percentiles: w.percentiles,
        }
    }
}

/// Distribution summary: unit-less samples (payload sizes, batch lengths).
#[derive(Clone, Debug, Default)]
pub struct Summary {
    cell: Option<Arc<DistributionCell>>,
}

impl Summary {
    pub(crate) fn live(cell: Arc<DistributionCell>) -> Self {
        Self { cell: Some(cell) }
    }

    pub fn noop() -> Self {
        Self { cell: None }
    }

    pub fn is_noop(&self) -> bool {
        self.cell.is_none()
    }

    /// Zero and negative values are accepted; NaN/inf are ignored.
    pub fn record(&self, v: f64) {
        if let Some(c) = &self.cell {
            c.record(v);
        }
    }

    pub fn sample(&self) -> Option<DistributionSample> {
        self.cell.as_ref().map(|c| c.sample())
    }

    /// Windowed histogram view.
    pub fn window(&self) -> Option<HistogramSnapshot> {
        self.cell.as_ref().map(|c| c.window())
    }

    pub fn same_instrument(&self, other: &Summary) -> bool {
        match (&self.cell, &other.cell) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
