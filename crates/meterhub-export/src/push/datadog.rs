//! Datadog series API (`POST /api/v1/series`).
//!
//! Counters and timer count/sum are sent as `count` deltas for the step;
//! gauges, max, and percentiles as `gauge`. Percentiles carry a `phi:<p>` tag.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use meterhub_core::error::{MeterError, Result};
use meterhub_core::{DistributionSample, MeterId, Sample, Snapshot};

use super::step::{PendingCommit, StepDeltas};
use super::transport::{PushRequest, Transport};
use super::PushExporter;
use crate::config::DatadogSection;

#[derive(Debug, Serialize)]
struct Series {
    metric: String,
    points: Vec<(u64, f64)>,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SeriesPayload {
    series: Vec<Series>,
}

pub struct DatadogExporter {
    api_key: String,
    url: String,
    host: Option<String>,
    transport: Arc<dyn Transport>,
    deltas: StepDeltas,
}

impl DatadogExporter {
    pub fn new(cfg: &DatadogSection, transport: Arc<dyn Transport>) -> Self {
        Self {
            api_key: cfg.api_key.clone(),
            url: format!("{}/api/v1/series", cfg.uri.trim_end_matches('/')),
            host: cfg.host.clone(),
            transport,
            deltas: StepDeltas::new(),
        }
    }

    fn series(&self, name: String, kind: &'static str, ts: u64, value: f64, tags: Vec<String>) -> Series {
        Series {
            metric: name,
            points: vec![(ts, value)],
            kind,
            host: self.host.clone(),
            tags,
        }
    }

    fn encode_distribution(
        &self,
        out: &mut Vec<Series>,
        pending: &mut PendingCommit,
        id: &MeterId,
        d: &DistributionSample,
        ts: u64,
    ) {
        let name = id.name();
        let tags = tags_of(id);
        let count = self.deltas.delta(pending, id, "count", d.count as f64);
        let sum = self.deltas.signed_delta(pending, id, "sum", d.total);

        out.push(self.series(format!("{name}.count"), "count", ts, count, tags.clone()));
        out.push(self.series(format!("{name}.sum"), "count", ts, sum, tags.clone()));
        if count > 0.0 {
            out.push(self.series(format!("{name}.avg"), "gauge", ts, sum / count, tags.clone()));
        }
        out.push(self.series(format!("{name}.max"), "gauge", ts, d.max, tags.clone()));
        for (p, v) in &d.percentiles {
            let mut t = tags.clone();
            t.push(format!("phi:{p}"));
            out.push(self.series(format!("{name}.percentile"), "gauge", ts, *v, t));
        }
    }

    fn encode(&self, snapshot: &Snapshot, pending: &mut PendingCommit) -> Vec<Series> {
        let ts = unix_secs();
        let mut out = Vec::with_capacity(snapshot.len());
        for s in snapshot.iter() {
            match &s.sample {
                Sample::Counter(v) => {
                    let delta = self.deltas.delta(pending, &s.id, "value", *v as f64);
                    out.push(self.series(s.id.name().to_string(), "count", ts, delta, tags_of(&s.id)));
                }
                Sample::Gauge(v) if v.is_finite() => {
                    out.push(self.series(s.id.name().to_string(), "gauge", ts, *v, tags_of(&s.id)));
                }
                Sample::Gauge(_) => {
                    tracing::debug!(meter = %s.id, "non-finite gauge not sent");
                }
                Sample::Timer(d) | Sample::Summary(d) => {
                    self.encode_distribution(&mut out, pending, &s.id, d, ts)
                }
            }
        }
        out
    }
}

#[async_trait]
impl PushExporter for DatadogExporter {
    fn name(&self) -> &'static str {
        "datadog"
    }

    async fn flush(&self, snapshot: &Snapshot) -> Result<()> {
        let mut pending = PendingCommit::default();
        let series = self.encode(snapshot, &mut pending);
        if series.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(&SeriesPayload { series })
            .map_err(|e| MeterError::Internal(format!("datadog encode failed: {e}")))?;

        self.transport
            .send(PushRequest {
                exporter: self.name(),
                url: self.url.clone(),
                headers: vec![("DD-API-KEY".into(), self.api_key.clone())],
                content_type: "application/json",
                body: Bytes::from(body),
            })
            .await?;

        self.deltas.commit(pending);
        Ok(())
    }
}

fn tags_of(id: &MeterId) -> Vec<String> {
    id.tags().iter().map(|t| format!("{}:{}", t.key, t.value)).collect()
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
