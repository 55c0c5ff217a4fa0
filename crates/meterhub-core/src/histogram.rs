//! Decaying ring-buffer histogram.
//!
//! `buffer_length` rings each cover `expiry / buffer_length` of wall time. The
//! write pointer advances lazily on the next `record`/`snapshot` once the
//! current ring's window has elapsed; rings that fall out of the expiry window
//! are cleared as the pointer passes over them. There is no background timer.
//!
//! Each ring stores a sparse log-bucketed count map (relative error about
//! 2^(1/16)), plus exact count/sum/min/max. Negative samples use the same
//! buckets mirrored around an exact zero bucket. Reported percentiles are clamped to
//! the exact min/max of the live window, and max decays with the ring that held
//! it.
//!
//! The type is not synchronized; owners wrap it in a lock scoped to
//! rotate+insert.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Sub-buckets per power of two.
const SUB_BUCKETS: f64 = 16.0;

pub const DEFAULT_BUFFER_LENGTH: usize = 1024;
pub const MAX_BUFFER_LENGTH: usize = 65536;
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Ordered by the value the bucket represents: most negative first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Negative(Reverse<i32>),
    Zero,
    Positive(i32),
}

#[derive(Debug, Clone, Default)]
struct Ring {
    buckets: BTreeMap<Bucket, u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Ring {
    fn clear(&mut self) {
        self.buckets.clear();
        self.count = 0;
        self.sum = 0.0;
        self.min = 0.0;
        self.max = 0.0;
    }

    fn record(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.count += 1;
        self.sum += v;
        *self.buckets.entry(bucket_index(v)).or_insert(0) += 1;
    }
}

fn log_index(magnitude: f64) -> i32 {
    // the `as` cast saturates, so subnormals and huge values stay in range
    (magnitude.log2() * SUB_BUCKETS).floor() as i32
}

fn log_value(idx: i32) -> f64 {
    ((idx as f64 + 0.5) / SUB_BUCKETS).exp2()
}

fn bucket_index(v: f64) -> Bucket {
    if v > 0.0 {
        Bucket::Positive(log_index(v))
    } else if v < 0.0 {
        Bucket::Negative(Reverse(log_index(-v)))
    } else {
        Bucket::Zero
    }
}

fn bucket_value(b: Bucket) -> f64 {
    match b {
        Bucket::Positive(idx) => log_value(idx),
        Bucket::Negative(Reverse(idx)) => -log_value(idx),
        Bucket::Zero => 0.0,
    }
}

/// Point-in-time view over the live (non-expired) window.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    /// `(p, value)` pairs in the order requested.
    pub percentiles: Vec<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct RingHistogram {
    rings: Vec<Ring>,
    current: usize,
    window: Duration,
    rotated_at: Instant,
}

impl RingHistogram {
    /// `buffer_length` is clamped to `1..=MAX_BUFFER_LENGTH`; each ring is at least 1ns wide.
    pub fn new(buffer_length: usize, expiry: Duration, now: Instant) -> Self {
        let n = buffer_length.clamp(1, MAX_BUFFER_LENGTH);
        let window = (expiry / n as u32).max(Duration::from_nanos(1));
        Self {
            rings: vec![Ring::default(); n],
            current: 0,
            window,
            rotated_at: now,
        }
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    /// Width of one ring.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Rotate if due, then add the sample to the current ring.
    pub fn record(&mut self, value: f64, now: Instant) {
        if !value.is_finite() {
            return;
        }
        self.rotate(now);
        if let Some(ring) = self.rings.get_mut(self.current) {
            ring.record(value);
        }
    }

    pub fn snapshot(&mut self, percentiles: &[f64], now: Instant) -> HistogramSnapshot {
        self.rotate(now);

        let mut merged: BTreeMap<Bucket, u64> = BTreeMap::new();
        let mut count = 0u64;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for ring in self.rings.iter().filter(|r| r.count > 0) {
            count += ring.count;
            sum += ring.sum;
            min = min.min(ring.min);
            max = max.max(ring.max);
            for (idx, c) in &ring.buckets {
                *merged.entry(*idx).or_insert(0) += c;
            }
        }

        if count == 0 {
            return HistogramSnapshot {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                percentiles: percentiles.iter().map(|p| (*p, 0.0)).collect(),
            };
        }

        let percentiles = percentiles
            .iter()
            .map(|p| (*p, quantile(&merged, count, *p).max(min).min(max)))
            .collect();

        HistogramSnapshot {
            count,
            sum,
            min,
            max,
            percentiles,
        }
    }

    fn rotate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.rotated_at);
        if elapsed < self.window {
            return;
        }
        let n = self.rings.len();
        let steps = elapsed.as_nanos() / self.window.as_nanos();

        if steps >= n as u128 {
            for r in &mut self.rings {
                r.clear();
            }
            self.current = (self.current + 1) % n;
            self.rotated_at = now;
            return;
        }

        // steps < n <= MAX_BUFFER_LENGTH
        let steps = steps as usize;
        for _ in 0..steps {
            self.current = (self.current + 1) % n;
            if let Some(r) = self.rings.get_mut(self.current) {
                r.clear();
            }
        }
        self.rotated_at += self.window * steps as u32;
    }
}

fn quantile(merged: &BTreeMap<Bucket, u64>, count: u64, p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    let rank = ((p * count as f64).ceil() as u64).clamp(1, count);
    let mut seen = 0u64;
    for (idx, c) in merged {
        seen += c;
        if seen >= rank {
            return bucket_value(*idx);
        }
    }
    merged.keys().next_back().map(|i| bucket_value(*i)).unwrap_or(0.0)
}
