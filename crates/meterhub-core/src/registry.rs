//! Instrument registry.
//!
//! Owns every instrument keyed by its post-filter `MeterId`. Registration is
//! idempotent: the `DashMap` entry for an id is created by exactly one caller
//! and every later (or racing) caller gets a handle to the same cell.
//!
//! Filter results are memoized per raw `(MeterId, MeterKind)` up to
//! `memo_capacity` entries. Names are bound to a single kind on first
//! registration; a later registration with another kind fails with
//! `KindConflict`.
//!
//! `snapshot()` clones the `Arc` handles out of the map shard by shard, then
//! evaluates them without holding any map lock, so gauge accessors and
//! concurrent registrations never contend with a scrape.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::error::{MeterError, Result};
use crate::filter::{FilterChain, MeterFilter};
use crate::histogram::{DEFAULT_BUFFER_LENGTH, DEFAULT_EXPIRY};
use crate::id::{MeterId, MeterKind, Tag};
use crate::instrument::counter::CounterCell;
use crate::instrument::distribution::DistributionCell;
use crate::instrument::gauge::GaugeCell;
use crate::instrument::{Counter, Gauge, Instrument, Summary, Timer};
use crate::snapshot::{MeterSample, Sample, Snapshot};

pub const DEFAULT_PERCENTILES: [f64; 3] = [0.5, 0.95, 0.99];
pub const DEFAULT_MEMO_CAPACITY: usize = 8192;

/// Registry construction parameters. Fixed for the registry's lifetime.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub enabled: bool,
    /// Applied before any filter; instrument tags win on key collisions.
    pub common_tags: Vec<Tag>,
    pub percentiles: Vec<f64>,
    pub buffer_length: usize,
    pub expiry: Duration,
    pub memo_capacity: usize,
    /// Applied in order after common tags.
    pub filters: FilterChain,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            common_tags: Vec::new(),
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            buffer_length: DEFAULT_BUFFER_LENGTH,
            expiry: DEFAULT_EXPIRY,
            memo_capacity: DEFAULT_MEMO_CAPACITY,
            filters: FilterChain::new(),
        }
    }
}

impl RegistrySettings {
    pub fn common_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_tags.push(Tag::new(key, value));
        self
    }

    /// Append a filter after the ones already configured.
    pub fn filter(mut self, f: MeterFilter) -> Self {
        self.filters.push(f);
        self
    }
}

#[derive(Clone, Debug)]
enum Slot {
    Counter(Arc<CounterCell>),
    Gauge(Arc<GaugeCell>),
    Timer(Arc<DistributionCell>),
    Summary(Arc<DistributionCell>),
}

impl Slot {
    fn kind(&self) -> MeterKind {
        match self {
            Slot::Counter(_) => MeterKind::Counter,
            Slot::Gauge(_) => MeterKind::Gauge,
            Slot::Timer(_) => MeterKind::Timer,
            Slot::Summary(_) => MeterKind::Summary,
        }
    }

    fn handle(&self) -> Instrument {
        match self {
            Slot::Counter(c) => Instrument::Counter(Counter::live(Arc::clone(c))),
            Slot::Gauge(g) => Instrument::Gauge(Gauge::live(Arc::clone(g))),
            Slot::Timer(d) => Instrument::Timer(Timer::live(Arc::clone(d))),
            Slot::Summary(d) => Instrument::Summary(Summary::live(Arc::clone(d))),
        }
    }
}

pub struct Registry {
    enabled: bool,
    chain: FilterChain,
    percentiles: Arc<[f64]>,
    buffer_length: usize,
    expiry: Duration,
    memo_capacity: usize,
    clock: Arc<dyn Clock>,

    meters: DashMap<MeterId, Slot>,
    kinds: DashMap<String, MeterKind>,
    resolved: DashMap<(MeterId, MeterKind), Option<MeterId>>,
    descriptions: DashMap<String, String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

impl Registry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: RegistrySettings, clock: Arc<dyn Clock>) -> Self {
        // common tags run first so later filters can see (and rewrite) them
        let mut chain = FilterChain::new();
        if !settings.common_tags.is_empty() {
            chain.push(MeterFilter::common_tags(settings.common_tags));
        }
        chain.extend(settings.filters);

        Self {
            enabled: settings.enabled,
            chain,
            percentiles: settings.percentiles.into(),
            buffer_length: settings.buffer_length,
            expiry: settings.expiry,
            memo_capacity: settings.memo_capacity,
            clock,
            meters: DashMap::new(),
            kinds: DashMap::new(),
            resolved: DashMap::new(),
            descriptions: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of live (non-dropped) instruments.
    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// HELP text for every instrument named `name`.
    pub fn describe(&self, name: impl Into<String>, text: impl Into<String>) {
        self.descriptions.insert(name.into(), text.into());
    }

    /// Generic registration. Gauges created here are push-style (settable).
    pub fn register(&self, name: &str, tags: &[(&str, &str)], kind: MeterKind) -> Result<Instrument> {
        let raw = MeterId::new(name, tags.iter().copied());
        self.register_id(raw, kind, || self.make_slot(kind))
    }

    pub fn counter(&self, name: &str, tags: &[(&str, &str)]) -> Result<Counter> {
        Ok(self
            .register(name, tags, MeterKind::Counter)?
            .into_counter()
            .unwrap_or_default())
    }

    /// Push-style gauge; call `set` on the handle.
    pub fn gauge_value(&self, name: &str, tags: &[(&str, &str)]) -> Result<Gauge> {
        Ok(self
            .register(name, tags, MeterKind::Gauge)?
            .into_gauge()
            .unwrap_or_default())
    }

    /// Pull-style gauge observing `obj` through a weak reference.
    ///
    /// If the gauge already exists the existing instrument is returned and
    /// `obj` is not observed.
    pub fn gauge<T, F>(&self, name: &str, tags: &[(&str, &str)], obj: &Arc<T>, f: F) -> Result<Gauge>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        let raw = MeterId::new(name, tags.iter().copied());
        let h = self.register_id(raw, MeterKind::Gauge, || {
            Slot::Gauge(Arc::new(GaugeCell::observing(obj, f)))
        })?;
        Ok(h.into_gauge().unwrap_or_default())
    }

    pub fn timer(&self, name: &str, tags: &[(&str, &str)]) -> Result<Timer> {
        Ok(self
            .register(name, tags, MeterKind::Timer)?
            .into_timer()
            .unwrap_or_default())
    }

    pub fn summary(&self, name: &str, tags: &[(&str, &str)]) -> Result<Summary> {
        Ok(self
            .register(name, tags, MeterKind::Summary)?
            .into_summary()
            .unwrap_or_default())
    }

    fn make_slot(&self, kind: MeterKind) -> Slot {
        match kind {
            MeterKind::Counter => Slot::Counter(Arc::new(CounterCell::default())),
            MeterKind::Gauge => Slot::Gauge(Arc::new(GaugeCell::settable())),
            MeterKind::Timer => Slot::Timer(Arc::new(self.make_distribution())),
            MeterKind::Summary => Slot::Summary(Arc::new(self.make_distribution())),
        }
    }

    fn make_distribution(&self) -> DistributionCell {
        DistributionCell::new(
            self.buffer_length,
            self.expiry,
            Arc::clone(&self.percentiles),
            Arc::clone(&self.clock),
        )
    }

    fn register_id(
        &self,
        raw: MeterId,
        kind: MeterKind,
        make: impl FnOnce() -> Slot,
    ) -> Result<Instrument> {
        if !self.enabled {
            return Ok(noop(kind));
        }

        let Some(id) = self.resolve(raw, kind) else {
            return Ok(noop(kind));
        };

        // bind name -> kind; the shard lock makes the first kind win
        match self.kinds.entry(id.name().to_string()) {
            Entry::Occupied(e) if *e.get() != kind => {
                return Err(MeterError::KindConflict {
                    name: id.name().to_string(),
                    existing: *e.get(),
                    requested: kind,
                });
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(e) => {
                e.insert(kind);
            }
        }

        let slot = self.meters.entry(id).or_insert_with(make).value().clone();
        if slot.kind() != kind {
            return Err(MeterError::Internal(format!(
                "slot kind {} does not match {kind}",
                slot.kind()
            )));
        }
        Ok(slot.handle())
    }

    /// Run the filter chain once per raw identity.
    fn resolve(&self, raw: MeterId, kind: MeterKind) -> Option<MeterId> {
        if self.chain.is_empty() {
            return Some(raw);
        }
        let key = (raw, kind);
        if let Some(hit) = self.resolved.get(&key) {
            return hit.value().clone();
        }
        let out = self.chain.apply(key.0.clone());
        if self.resolved.len() < self.memo_capacity {
            self.resolved.insert(key, out.clone());
        }
        out
    }

    /// Point-in-time view, sorted by id. Per-instrument consistency only.
    pub fn snapshot(&self) -> Snapshot {
        let mut slots: Vec<(MeterId, Slot)> = self
            .meters
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut samples = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            let sample = match &slot {
                Slot::Counter(c) => Sample::Counter(c.load()),
                Slot::Gauge(g) => match catch_unwind(AssertUnwindSafe(|| g.value())) {
                    Ok(Some(v)) => Sample::Gauge(v),
                    Ok(None) => continue,
                    Err(_) => {
                        let err = MeterError::render(&id, "gauge accessor panicked");
                        tracing::warn!(meter = %id, code = err.code().as_str(), error = %err, "gauge skipped");
                        continue;
                    }
                },
                Slot::Timer(d) => Sample::Timer(d.sample()),
                Slot::Summary(d) => Sample::Summary(d.sample()),
            };
            let description = self.descriptions.get(id.name()).map(|d| d.value().clone());
            samples.push(MeterSample {
                id,
                description,
                sample,
            });
        }
        Snapshot { samples }
    }
}

fn noop(kind: MeterKind) -> Instrument {
    match kind {
        MeterKind::Counter => Instrument::Counter(Counter::noop()),
        MeterKind::Gauge => Instrument::Gauge(Gauge::noop()),
        MeterKind::Timer => Instrument::Timer(Timer::noop()),
        MeterKind::Summary => Instrument::Summary(Summary::noop()),
    }
}
