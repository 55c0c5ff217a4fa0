use std::sync::Arc;
use std::time::{Duration, Instant};

use super::distribution::{DistributionCell, DistributionSample};
use crate::histogram::HistogramSnapshot;

/// Latency timer. Samples are stored in seconds.
#[derive(Clone, Debug, Default)]
pub struct Timer {
    cell: Option<Arc<DistributionCell>>,
}

impl Timer {
    pub(crate) fn live(cell: Arc<DistributionCell>) -> Self {
        Self { cell: Some(cell) }
    }

    pub fn noop() -> Self {
        Self { cell: None }
    }

    pub fn is_noop(&self) -> bool {
        self.cell.is_none()
    }

    /// Record one duration (zero is fine).
    pub fn record(&self, d: Duration) {
        if let Some(c) = &self.cell {
            c.record(d.as_secs_f64());
        }
    }

    /// Time `f` and return its result.
    pub fn record_with<R>(&self, f: impl FnOnce() -> R) -> R {
        let sample = self.start();
        let out = f();
        sample.stop(self);
        out
    }

    /// Start a sample; stop it against this (or another) timer later.
    pub fn start(&self) -> TimerSample {
        TimerSample {
            started: self.now(),
        }
    }

    pub fn count(&self) -> u64 {
        self.sample().map(|s| s.count).unwrap_or(0)
    }

    pub fn total_time(&self) -> Duration {
        self.sample()
            .map(|s| secs(s.total))
            .unwrap_or_default()
    }

    /// Max over the live window.
    pub fn max(&self) -> Duration {
        self.sample()
            .map(|s| secs(s.max))
            .unwrap_or_default()
    }

    pub fn sample(&self) -> Option<DistributionSample> {
        self.cell.as_ref().map(|c| c.sample())
    }

    pub fn window(&self) -> Option<HistogramSnapshot> {
        self.cell.as_ref().map(|c| c.window())
    }

    pub fn same_instrument(&self, other: &Timer) -> bool {
        match (&self.cell, &other.cell) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn now(&self) -> Instant {
        match &self.cell {
            Some(c) => c.clock().now(),
            None => Instant::now(),
        }
    }
}

fn secs(v: f64) -> Duration {
    Duration::try_from_secs_f64(v.max(0.0)).unwrap_or(Duration::MAX)
}

/// In-flight timing started by `Timer::start`.
#[derive(Debug, Clone, Copy)]
pub struct TimerSample {
    started: Instant,
}

impl TimerSample {
    /// Record the elapsed time into `timer` and return it.
    pub fn stop(self, timer: &Timer) -> Duration {
        let elapsed = timer.now().saturating_duration_since(self.started);
        timer.record(elapsed);
        elapsed
    }
}
