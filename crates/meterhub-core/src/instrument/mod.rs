//! Instrument handles (counter, gauge, timer, summary).
//!
//! Each public handle wraps `Option<Arc<..>>`: `None` is the no-op instrument
//! returned for filtered-out identities or a disabled registry. Recording into a
//! no-op handle silently discards the value.

pub mod counter;
pub mod distribution;
pub mod gauge;
pub mod timer;

pub use counter::Counter;
pub use distribution::{DistributionSample, Summary};
pub use gauge::Gauge;
pub use timer::{Timer, TimerSample};

use crate::id::MeterKind;

/// Handle returned by the generic `Registry::register`.
#[derive(Clone, Debug)]
pub enum Instrument {
    Counter(Counter),
    Gauge(Gauge),
    Timer(Timer),
    Summary(Summary),
}

impl Instrument {
    pub fn kind(&self) -> MeterKind {
        match self {
            Instrument::Counter(_) => MeterKind::Counter,
            Instrument::Gauge(_) => MeterKind::Gauge,
            Instrument::Timer(_) => MeterKind::Timer,
            Instrument::Summary(_) => MeterKind::Summary,
        }
    }

    pub fn is_noop(&self) -> bool {
        match self {
            Instrument::Counter(c) => c.is_noop(),
            Instrument::Gauge(g) => g.is_noop(),
            Instrument::Timer(t) => t.is_noop(),
            Instrument::Summary(s) => s.is_noop(),
        }
    }

    pub fn into_counter(self) -> Option<Counter> {
        match self {
            Instrument::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_gauge(self) -> Option<Gauge> {
        match self {
            Instrument::Gauge(g) => Some(g),
            _ => None,
        }
    }

    pub fn into_timer(self) -> Option<Timer> {
        match self {
            Instrument::Timer(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_summary(self) -> Option<Summary> {
        match self {
            Instrument::Summary(s) => Some(s),
            _ => None,
        }
    }
}
