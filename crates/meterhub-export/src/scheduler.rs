//! Periodic push scheduler.
//!
//! One task per destination. Each tick snapshots the registry and spawns a
//! send; a tick that finds the previous send still running is skipped, so at
//! most one send per destination is ever in flight. Send failures are retried
//! with exponential backoff, then counted and logged; the loop never exits on
//! error. On cancellation an in-flight send gets `shutdown_grace` to finish
//! before it is aborted.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meterhub_core::error::{MeterError, Result};
use meterhub_core::{Counter, Registry, Snapshot};

use crate::config::ExportSection;
use crate::push::PushExporter;

pub const FAILURES_METER: &str = "meterhub.export.failures";
pub const SKIPPED_METER: &str = "meterhub.export.skipped";

#[derive(Debug, Clone)]
pub struct PushSettings {
    pub step: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub shutdown_grace: Duration,
}

impl PushSettings {
    pub fn from_config(cfg: &ExportSection) -> Self {
        Self {
            step: cfg.step,
            timeout: cfg.timeout,
            max_retries: cfg.max_retries,
            retry_backoff: cfg.retry_backoff,
            shutdown_grace: cfg.shutdown_grace,
        }
    }
}

pub struct Scheduler {
    registry: Arc<Registry>,
    settings: PushSettings,
    exporters: Vec<Arc<dyn PushExporter>>,
}

/// Running scheduler. Dropping it leaves the tasks running until `cancel`
/// fires; call [`SchedulerHandle::shutdown`] to stop and drain.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, settings: PushSettings, exporters: Vec<Arc<dyn PushExporter>>) -> Self {
        Self {
            registry,
            settings,
            exporters,
        }
    }

    /// Start one loop per exporter. The first flush happens one `step` after spawn.
    pub fn spawn(self, cancel: CancellationToken) -> SchedulerHandle {
        let tasks: Vec<JoinHandle<()>> = self
            .exporters
            .into_iter()
            .map(|exporter| {
                let dest = Destination::new(&self.registry, exporter, self.settings.clone());
                tokio::spawn(dest.run(cancel.clone()))
            })
            .collect();

        info!(
            destinations = tasks.len(),
            step_ms = self.settings.step.as_millis() as u64,
            "push scheduler started"
        );

        SchedulerHandle { cancel, tasks }
    }
}

impl SchedulerHandle {
    /// Cancel every loop and wait for them (each bounded by its drain grace).
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for res in join_all(self.tasks).await {
            if let Err(e) = res {
                warn!(error = %e, "push task ended abnormally");
            }
        }
        info!("push scheduler stopped");
    }
}

struct Destination {
    registry: Arc<Registry>,
    exporter: Arc<dyn PushExporter>,
    settings: PushSettings,
    failures: Counter,
    skipped: Counter,
}

impl Destination {
    fn new(registry: &Arc<Registry>, exporter: Arc<dyn PushExporter>, settings: PushSettings) -> Self {
        let name = exporter.name();
        Self {
            failures: self_counter(registry, FAILURES_METER, name),
            skipped: self_counter(registry, SKIPPED_METER, name),
            registry: Arc::clone(registry),
            exporter,
            settings,
        }
    }

    async fn run(self, cancel: CancellationToken) {
        let step = self.settings.step;
        let mut ticker = interval_at(Instant::now() + step, step);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                        self.skipped.inc();
                        debug!(exporter = self.exporter.name(), "previous send still in flight; tick skipped");
                        continue;
                    }
                    in_flight = Some(self.spawn_send());
                }
            }
        }

        if let Some(mut handle) = in_flight {
            if timeout(self.settings.shutdown_grace, &mut handle).await.is_err() {
                handle.abort();
                warn!(exporter = self.exporter.name(), "in-flight send abandoned at shutdown");
            }
        }
    }

    fn spawn_send(&self) -> JoinHandle<()> {
        let snapshot = self.registry.snapshot();
        let exporter = Arc::clone(&self.exporter);
        let settings = self.settings.clone();
        let failures = self.failures.clone();

        tokio::spawn(async move {
            if let Err(e) = deliver(exporter.as_ref(), &snapshot, &settings).await {
                failures.inc();
                warn!(
                    exporter = exporter.name(),
                    code = e.code().as_str(),
                    error = %e,
                    "push failed after retries"
                );
            }
        })
    }
}

/// One flush with per-attempt timeout and up to `max_retries` retries.
pub async fn deliver(exporter: &dyn PushExporter, snapshot: &Snapshot, settings: &PushSettings) -> Result<()> {
    let mut attempt: u32 = 0;
    loop {
        let res = match timeout(settings.timeout, exporter.flush(snapshot)).await {
            Ok(r) => r,
            Err(_) => Err(MeterError::delivery(
                exporter.name(),
                format!("timed out after {}ms", settings.timeout.as_millis()),
            )),
        };

        match res {
            Ok(()) => return Ok(()),
            Err(e) if attempt < settings.max_retries => {
                let backoff = settings.retry_backoff.saturating_mul(1u32 << attempt.min(16));
                debug!(
                    exporter = exporter.name(),
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "push attempt failed; retrying"
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn self_counter(registry: &Registry, meter: &str, exporter: &str) -> Counter {
    registry.counter(meter, &[("exporter", exporter)]).unwrap_or_else(|e| {
        warn!(meter, exporter, error = %e, "self-metric unavailable");
        Counter::noop()
    })
}
