//! JSON rendering.
//!
//! Counters and gauges are flat entries keyed `name;k=v;...`. Timers and
//! summaries nest under their bare name, with per-tag-set keys:
//!
//! ```json
//! {
//!   "requests_total;method=GET": 4,
//!   "op_seconds": { "count": 3, "elapsedTime": 0.06, "max": 0.03, "p50": 0.02 }
//! }
//! ```
//! Timer values are in seconds. Non-finite numbers cannot be encoded; the
//! affected instrument is skipped.

use serde_json::{Map, Number, Value};

use crate::error::{MeterError, Result};
use crate::id::MeterId;
use crate::instrument::DistributionSample;
use crate::snapshot::{Sample, Snapshot};

use super::percentile_label;

fn tag_suffix(id: &MeterId) -> String {
    id.tags()
        .iter()
        .map(|t| format!(";{}={}", t.key, t.value))
        .collect()
}

fn number(id: &MeterId, v: f64) -> Result<Value> {
    Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| MeterError::render(id, format!("non-finite value {v}")))
}

fn distribution_entries(id: &MeterId, d: &DistributionSample, sum_key: &str) -> Result<Vec<(String, Value)>> {
    let suffix = tag_suffix(id);
    let mut out = Vec::with_capacity(3 + d.percentiles.len());
    out.push((format!("count{suffix}"), Value::from(d.count)));
    out.push((format!("{sum_key}{suffix}"), number(id, d.total)?));
    out.push((format!("max{suffix}"), number(id, d.max)?));
    for (p, v) in &d.percentiles {
        out.push((format!("p{}{suffix}", percentile_label(*p)), number(id, *v)?));
    }
    Ok(out)
}

/// Render a snapshot. Never fails as a whole.
pub fn render(snapshot: &Snapshot) -> String {
    let mut root = Map::new();

    for s in snapshot.iter() {
        let res = match &s.sample {
            Sample::Counter(v) => {
                root.insert(format!("{}{}", s.id.name(), tag_suffix(&s.id)), Value::from(*v));
                Ok(())
            }
            Sample::Gauge(v) => number(&s.id, *v).map(|n| {
                root.insert(format!("{}{}", s.id.name(), tag_suffix(&s.id)), n);
            }),
            Sample::Timer(d) => nest(&mut root, &s.id, d, "elapsedTime"),
            Sample::Summary(d) => nest(&mut root, &s.id, d, "sum"),
        };
        if let Err(e) = res {
            tracing::warn!(meter = %s.id, error = %e, "instrument skipped");
        }
    }

    serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "json encode failed");
        "{}".to_string()
    })
}

fn nest(root: &mut Map<String, Value>, id: &MeterId, d: &DistributionSample, sum_key: &str) -> Result<()> {
    // build every entry first so a failure leaves nothing half-written
    let entries = distribution_entries(id, d, sum_key)?;
    let slot = root
        .entry(id.name().to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(obj) = slot {
        obj.extend(entries);
    }
    Ok(())
}
