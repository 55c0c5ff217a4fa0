//! Azure Monitor / Application Insights track API (`POST /v2/track`).
//!
//! One `MetricData` envelope per sample. Counters and distribution sums are
//! step deltas; timer values are converted to milliseconds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use meterhub_core::error::{MeterError, Result};
use meterhub_core::{MeterId, Sample, Snapshot};

use super::step::{PendingCommit, StepDeltas};
use super::transport::{PushRequest, Transport};
use super::PushExporter;
use crate::config::AzureMonitorSection;

#[derive(Debug, Serialize)]
struct DataPoint {
    name: String,
    /// 0 = measurement, 1 = aggregation.
    kind: u8,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
}

#[derive(Debug, Serialize)]
struct MetricData {
    ver: u8,
    metrics: Vec<DataPoint>,
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Data {
    base_type: &'static str,
    base_data: MetricData,
}

#[derive(Debug, Serialize)]
struct Envelope {
    name: String,
    time: String,
    #[serde(rename = "iKey")]
    ikey: String,
    data: Data,
}

pub struct AzureMonitorExporter {
    ikey: String,
    envelope_name: String,
    url: String,
    transport: Arc<dyn Transport>,
    deltas: StepDeltas,
}

impl AzureMonitorExporter {
    pub fn new(cfg: &AzureMonitorSection, transport: Arc<dyn Transport>) -> Self {
        let compact: String = cfg.instrumentation_key.chars().filter(|c| *c != '-').collect();
        Self {
            ikey: cfg.instrumentation_key.clone(),
            envelope_name: format!("Microsoft.ApplicationInsights.{compact}.Metric"),
            url: format!("{}/v2/track", cfg.uri.trim_end_matches('/')),
            transport,
            deltas: StepDeltas::new(),
        }
    }

    fn envelope(&self, time: &str, id: &MeterId, point: DataPoint) -> Envelope {
        Envelope {
            name: self.envelope_name.clone(),
            time: time.to_string(),
            ikey: self.ikey.clone(),
            data: Data {
                base_type: "MetricData",
                base_data: MetricData {
                    ver: 2,
                    metrics: vec![point],
                    properties: id
                        .tags()
                        .iter()
                        .map(|t| (t.key.clone(), t.value.clone()))
                        .collect(),
                },
            },
        }
    }

    fn encode(&self, snapshot: &Snapshot, pending: &mut PendingCommit) -> Vec<Envelope> {
        let time = humantime::format_rfc3339_millis(SystemTime::now()).to_string();
        let mut out = Vec::with_capacity(snapshot.len());

        for s in snapshot.iter() {
            let point = match &s.sample {
                Sample::Counter(v) => DataPoint {
                    name: s.id.name().to_string(),
                    kind: 0,
                    value: self.deltas.delta(pending, &s.id, "value", *v as f64),
                    count: None,
                    max: None,
                },
                Sample::Gauge(v) if v.is_finite() => DataPoint {
                    name: s.id.name().to_string(),
                    kind: 0,
                    value: *v,
                    count: None,
                    max: None,
                },
                Sample::Gauge(_) => {
                    tracing::debug!(meter = %s.id, "non-finite gauge not sent");
                    continue;
                }
                Sample::Timer(d) | Sample::Summary(d) => {
                    let scale = if matches!(s.sample, Sample::Timer(_)) { 1000.0 } else { 1.0 };
                    let count = self.deltas.delta(pending, &s.id, "count", d.count as f64);
                    let sum = self.deltas.signed_delta(pending, &s.id, "sum", d.total);
                    DataPoint {
                        name: s.id.name().to_string(),
                        kind: 1,
                        value: sum * scale,
                        count: Some(count as u64),
                        max: d.max.is_finite().then_some(d.max * scale),
                    }
                }
            };
            out.push(self.envelope(&time, &s.id, point));
        }
        out
    }
}

#[async_trait]
impl PushExporter for AzureMonitorExporter {
    fn name(&self) -> &'static str {
        "azure_monitor"
    }

    async fn flush(&self, snapshot: &Snapshot) -> Result<()> {
        let mut pending = PendingCommit::default();
        let envelopes = self.encode(snapshot, &mut pending);
        if envelopes.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(&envelopes)
            .map_err(|e| MeterError::Internal(format!("azure encode failed: {e}")))?;

        self.transport
            .send(PushRequest {
                exporter: self.name(),
                url: self.url.clone(),
                headers: Vec::new(),
                content_type: "application/json",
                body: Bytes::from(body),
            })
            .await?;

        self.deltas.commit(pending);
        Ok(())
    }
}
