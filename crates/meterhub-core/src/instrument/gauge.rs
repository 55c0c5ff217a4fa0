use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type ReadFn = dyn Fn() -> Option<f64> + Send + Sync;

enum GaugeSource {
    /// Push-style: last `set` wins.
    Value,
    /// Pull-style: evaluated at snapshot time through a weak reference.
    Observed(Box<ReadFn>),
}

pub(crate) struct GaugeCell {
    source: GaugeSource,
    last: AtomicU64,
    seen: AtomicBool,
}

impl fmt::Debug for GaugeCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.source {
            GaugeSource::Value => "value",
            GaugeSource::Observed(_) => "observed",
        };
        f.debug_struct("GaugeCell")
            .field("mode", &mode)
            .field("last", &self.last_known())
            .finish()
    }
}

impl GaugeCell {
    pub(crate) fn settable() -> Self {
        Self {
            source: GaugeSource::Value,
            last: AtomicU64::new(0f64.to_bits()),
            seen: AtomicBool::new(false),
        }
    }

    /// Observe `obj` without keeping it alive.
    pub(crate) fn observing<T, F>(obj: &Arc<T>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        let weak: Weak<T> = Arc::downgrade(obj);
        let read = move || weak.upgrade().map(|o| f(&o));
        Self {
            source: GaugeSource::Observed(Box::new(read)),
            last: AtomicU64::new(0f64.to_bits()),
            seen: AtomicBool::new(false),
        }
    }

    fn store(&self, v: f64) {
        self.last.store(v.to_bits(), Ordering::Relaxed);
        self.seen.store(true, Ordering::Release);
    }

    fn last_known(&self) -> Option<f64> {
        if self.seen.load(Ordering::Acquire) {
            Some(f64::from_bits(self.last.load(Ordering::Relaxed)))
        } else {
            None
        }
    }

    /// Current value. Observed gauges whose object is gone report the last
    /// value read, or `None` if they were never read.
    pub(crate) fn value(&self) -> Option<f64> {
        match &self.source {
            GaugeSource::Value => self.last_known(),
            GaugeSource::Observed(read) => match read() {
                Some(v) => {
                    self.store(v);
                    Some(v)
                }
                None => self.last_known(),
            },
        }
    }
}

/// Gauge handle.
#[derive(Clone, Debug, Default)]
pub struct Gauge {
    cell: Option<Arc<GaugeCell>>,
}

impl Gauge {
    pub(crate) fn live(cell: Arc<GaugeCell>) -> Self {
        Self { cell: Some(cell) }
    }

    pub fn noop() -> Self {
        Self { cell: None }
    }

    pub fn is_noop(&self) -> bool {
        self.cell.is_none()
    }

    /// Overwrite the value. Ignored on observed gauges.
    pub fn set(&self, v: f64) {
        let Some(cell) = &self.cell else { return };
        match cell.source {
            GaugeSource::Value => cell.store(v),
            GaugeSource::Observed(_) => {
                tracing::trace!("set() on an observed gauge ignored");
            }
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.cell.as_ref().and_then(|c| c.value())
    }

    pub fn same_instrument(&self, other: &Gauge) -> bool {
        match (&self.cell, &other.cell) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
