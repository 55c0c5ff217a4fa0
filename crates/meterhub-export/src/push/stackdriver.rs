//! Google Cloud Monitoring (`POST /v3/projects/{id}/timeSeries`).
//!
//! Counters and distribution counts are `CUMULATIVE` since exporter start;
//! everything else is a `GAUGE` double. Requests carry at most
//! [`MAX_SERIES_PER_REQUEST`] series.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use meterhub_core::error::{MeterError, Result};
use meterhub_core::{DistributionSample, MeterId, Sample, Snapshot};

use super::transport::{PushRequest, Transport};
use super::PushExporter;
use crate::config::StackdriverSection;

pub const MAX_SERIES_PER_REQUEST: usize = 200;

const METRIC_PREFIX: &str = "custom.googleapis.com/";

#[derive(Debug, Serialize)]
struct Metric {
    #[serde(rename = "type")]
    kind: String,
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Resource {
    #[serde(rename = "type")]
    kind: String,
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Interval {
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    end_time: String,
}

#[derive(Debug, Serialize)]
enum TypedValue {
    #[serde(rename = "int64Value")]
    Int64(String),
    #[serde(rename = "doubleValue")]
    Double(f64),
}

#[derive(Debug, Serialize)]
struct Point {
    interval: Interval,
    value: TypedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimeSeries {
    metric: Metric,
    resource: Resource,
    metric_kind: &'static str,
    value_type: &'static str,
    points: Vec<Point>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    time_series: &'a [TimeSeries],
}

pub struct StackdriverExporter {
    project_id: String,
    resource_type: String,
    url: String,
    started: String,
    transport: Arc<dyn Transport>,
}

impl StackdriverExporter {
    pub fn new(cfg: &StackdriverSection, transport: Arc<dyn Transport>) -> Self {
        Self {
            project_id: cfg.project_id.clone(),
            resource_type: cfg.resource_type.clone(),
            url: format!(
                "{}/v3/projects/{}/timeSeries",
                cfg.uri.trim_end_matches('/'),
                cfg.project_id
            ),
            started: rfc3339(SystemTime::now()),
            transport,
        }
    }

    fn resource(&self) -> Resource {
        let mut labels = BTreeMap::new();
        labels.insert("project_id".to_string(), self.project_id.clone());
        Resource {
            kind: self.resource_type.clone(),
            labels,
        }
    }

    fn cumulative(&self, name: &str, labels: BTreeMap<String, String>, end: &str, v: u64) -> TimeSeries {
        TimeSeries {
            metric: Metric {
                kind: format!("{METRIC_PREFIX}{name}"),
                labels,
            },
            resource: self.resource(),
            metric_kind: "CUMULATIVE",
            value_type: "INT64",
            points: vec![Point {
                interval: Interval {
                    start_time: Some(self.started.clone()),
                    end_time: end.to_string(),
                },
                // int64 values travel as JSON strings
                value: TypedValue::Int64(v.to_string()),
            }],
        }
    }

    fn gauge(&self, name: &str, labels: BTreeMap<String, String>, end: &str, v: f64) -> TimeSeries {
        TimeSeries {
            metric: Metric {
                kind: format!("{METRIC_PREFIX}{name}"),
                labels,
            },
            resource: self.resource(),
            metric_kind: "GAUGE",
            value_type: "DOUBLE",
            points: vec![Point {
                interval: Interval {
                    start_time: None,
                    end_time: end.to_string(),
                },
                value: TypedValue::Double(v),
            }],
        }
    }

    fn encode_distribution(&self, out: &mut Vec<TimeSeries>, id: &MeterId, d: &DistributionSample, end: &str) {
        let name = id.name();
        out.push(self.cumulative(&format!("{name}/count"), labels_of(id), end, d.count));
        if d.total.is_finite() {
            out.push(self.gauge(&format!("{name}/sum"), labels_of(id), end, d.total));
        }
        if d.max.is_finite() {
            out.push(self.gauge(&format!("{name}/max"), labels_of(id), end, d.max));
        }
        for (p, v) in &d.percentiles {
            if !v.is_finite() {
                continue;
            }
            let mut labels = labels_of(id);
            labels.insert("phi".to_string(), p.to_string());
            out.push(self.gauge(&format!("{name}/percentile"), labels, end, *v));
        }
    }

    fn encode(&self, snapshot: &Snapshot) -> Vec<TimeSeries> {
        let end = rfc3339(SystemTime::now());
        let mut out = Vec::with_capacity(snapshot.len());
        for s in snapshot.iter() {
            match &s.sample {
                Sample::Counter(v) => out.push(self.cumulative(s.id.name(), labels_of(&s.id), &end, *v)),
                Sample::Gauge(v) if v.is_finite() => {
                    out.push(self.gauge(s.id.name(), labels_of(&s.id), &end, *v))
                }
                Sample::Gauge(_) => {
                    tracing::debug!(meter = %s.id, "non-finite gauge not sent");
                }
                Sample::Timer(d) | Sample::Summary(d) => self.encode_distribution(&mut out, &s.id, d, &end),
            }
        }
        out
    }
}

#[async_trait]
impl PushExporter for StackdriverExporter {
    fn name(&self) -> &'static str {
        "stackdriver"
    }

    async fn flush(&self, snapshot: &Snapshot) -> Result<()> {
        let series = self.encode(snapshot);

        for batch in series.chunks(MAX_SERIES_PER_REQUEST) {
            let body = serde_json::to_vec(&CreateRequest { time_series: batch })
                .map_err(|e| MeterError::Internal(format!("stackdriver encode failed: {e}")))?;

            self.transport
                .send(PushRequest {
                    exporter: self.name(),
                    url: self.url.clone(),
                    headers: Vec::new(),
                    content_type: "application/json",
                    body: Bytes::from(body),
                })
                .await?;
        }
        Ok(())
    }
}

fn labels_of(id: &MeterId) -> BTreeMap<String, String> {
    id.tags()
        .iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

fn rfc3339(t: SystemTime) -> String {
    humantime::format_rfc3339_millis(t).to_string()
}
