//! Exporter that writes each sample as a structured `tracing` event.

use async_trait::async_trait;

use meterhub_core::error::Result;
use meterhub_core::{Sample, Snapshot};

use super::PushExporter;

#[derive(Debug, Default)]
pub struct LogExporter;

#[async_trait]
impl PushExporter for LogExporter {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn flush(&self, snapshot: &Snapshot) -> Result<()> {
        for s in snapshot.iter() {
            match &s.sample {
                Sample::Counter(v) => tracing::info!(meter = %s.id, kind = "counter", value = *v, "meter"),
                Sample::Gauge(v) => tracing::info!(meter = %s.id, kind = "gauge", value = *v, "meter"),
                Sample::Timer(d) | Sample::Summary(d) => tracing::info!(
                    meter = %s.id,
                    kind = s.sample.kind().as_str(),
                    count = d.count,
                    total = d.total,
                    max = d.max,
                    percentiles = ?d.percentiles,
                    "meter"
                ),
            }
        }
        Ok(())
    }
}
