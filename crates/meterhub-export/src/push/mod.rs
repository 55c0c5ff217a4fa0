//! Push exporters.
//!
//! Each destination encodes a [`Snapshot`] into its wire format and hands it
//! to a [`Transport`]. Scheduling, retries, and timeouts live in
//! `crate::scheduler`; exporters only encode and send once.

pub mod azure;
pub mod datadog;
pub mod log;
pub mod stackdriver;
pub mod step;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;

use meterhub_core::error::Result;
use meterhub_core::Snapshot;

use crate::config::ExportSection;

pub use azure::AzureMonitorExporter;
pub use datadog::DatadogExporter;
pub use log::LogExporter;
pub use stackdriver::StackdriverExporter;
pub use transport::{HttpTransport, PushRequest, Transport};

#[async_trait]
pub trait PushExporter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Encode and deliver one snapshot. A single attempt, no retries.
    async fn flush(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Exporters for every enabled destination, in config order.
pub fn build_exporters(cfg: &ExportSection, transport: Arc<dyn Transport>) -> Vec<Arc<dyn PushExporter>> {
    let mut out: Vec<Arc<dyn PushExporter>> = Vec::new();
    if cfg.datadog.enabled {
        out.push(Arc::new(DatadogExporter::new(&cfg.datadog, Arc::clone(&transport))));
    }
    if cfg.stackdriver.enabled {
        out.push(Arc::new(StackdriverExporter::new(&cfg.stackdriver, Arc::clone(&transport))));
    }
    if cfg.azure_monitor.enabled {
        out.push(Arc::new(AzureMonitorExporter::new(&cfg.azure_monitor, Arc::clone(&transport))));
    }
    if cfg.log.enabled {
        out.push(Arc::new(LogExporter));
    }
    out
}
