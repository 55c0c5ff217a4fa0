//! Registry snapshot handed to exporters.

use crate::id::{MeterId, MeterKind};
use crate::instrument::DistributionSample;

#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Counter(u64),
    Gauge(f64),
    Timer(DistributionSample),
    Summary(DistributionSample),
}

impl Sample {
    pub fn kind(&self) -> MeterKind {
        match self {
            Sample::Counter(_) => MeterKind::Counter,
            Sample::Gauge(_) => MeterKind::Gauge,
            Sample::Timer(_) => MeterKind::Timer,
            Sample::Summary(_) => MeterKind::Summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterSample {
    pub id: MeterId,
    pub description: Option<String>,
    pub sample: Sample,
}

/// Samples sorted by `MeterId` (name, then tags in key order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub samples: Vec<MeterSample>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeterSample> {
        self.samples.iter()
    }

    pub fn find(&self, id: &MeterId) -> Option<&MeterSample> {
        self.samples
            .binary_search_by(|s| s.id.cmp(id))
            .ok()
            .and_then(|i| self.samples.get(i))
    }
}
