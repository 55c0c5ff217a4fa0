//! Push scheduling under paused time: retries, overlap skipping, shutdown drain.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use meterhub_core::error::{MeterError, Result};
use meterhub_core::{MeterId, Registry, Sample, Snapshot};
use meterhub_export::config::DatadogSection;
use meterhub_export::push::{DatadogExporter, PushExporter, PushRequest, Transport};
use meterhub_export::scheduler::{deliver, PushSettings, Scheduler, FAILURES_METER, SKIPPED_METER};

enum Behavior {
    Fail,
    FailTimes(u32),
    Slow(Duration),
    Hang,
}

struct FakeExporter {
    behavior: Behavior,
    attempts: AtomicU32,
}

impl FakeExporter {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            attempts: AtomicU32::new(0),
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushExporter for FakeExporter {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn flush(&self, _snapshot: &Snapshot) -> Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Fail => Err(MeterError::delivery("fake", "connection refused")),
            Behavior::FailTimes(k) if n < *k => Err(MeterError::delivery("fake", "503")),
            Behavior::FailTimes(_) => Ok(()),
            Behavior::Slow(d) => {
                sleep(*d).await;
                Ok(())
            }
            Behavior::Hang => std::future::pending().await,
        }
    }
}

fn dests(e: &Arc<FakeExporter>) -> Vec<Arc<dyn PushExporter>> {
    vec![Arc::clone(e) as Arc<dyn PushExporter>]
}

fn settings() -> PushSettings {
    PushSettings {
        step: Duration::from_secs(1),
        timeout: Duration::from_secs(10),
        max_retries: 2,
        retry_backoff: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(5),
    }
}

fn self_metric(reg: &Registry, name: &str) -> u64 {
    exporter_metric(reg, name, "fake")
}

fn exporter_metric(reg: &Registry, name: &str, exporter: &str) -> u64 {
    let id = MeterId::new(name, [("exporter", exporter)]);
    match reg.snapshot().find(&id).map(|s| s.sample.clone()) {
        Some(Sample::Counter(v)) => v,
        other => panic!("{name}: unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn failing_destination_keeps_ticking() {
    let reg = Arc::new(Registry::default());
    let exporter = FakeExporter::new(Behavior::Fail);
    let handle = Scheduler::new(Arc::clone(&reg), settings(), dests(&exporter))
        .spawn(CancellationToken::new());

    sleep(Duration::from_millis(5_500)).await;

    // 5 ticks x (1 attempt + 2 retries)
    assert_eq!(exporter.attempts(), 15);
    assert_eq!(self_metric(&reg, FAILURES_METER), 5);
    assert_eq!(self_metric(&reg, SKIPPED_METER), 0);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn first_flush_waits_one_step() {
    let reg = Arc::new(Registry::default());
    let exporter = FakeExporter::new(Behavior::FailTimes(0));
    let handle = Scheduler::new(Arc::clone(&reg), settings(), dests(&exporter))
        .spawn(CancellationToken::new());

    sleep(Duration::from_millis(900)).await;
    assert_eq!(exporter.attempts(), 0);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(exporter.attempts(), 1);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn overlapping_ticks_are_skipped() {
    let reg = Arc::new(Registry::default());
    let exporter = FakeExporter::new(Behavior::Slow(Duration::from_millis(2_500)));
    let handle = Scheduler::new(Arc::clone(&reg), settings(), dests(&exporter))
        .spawn(CancellationToken::new());

    sleep(Duration::from_millis(5_500)).await;

    // sends start at t=1 and t=4; ticks 2, 3, 5 find one in flight
    assert_eq!(exporter.attempts(), 2);
    assert_eq!(self_metric(&reg, SKIPPED_METER), 3);
    assert_eq!(self_metric(&reg, FAILURES_METER), 0);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_hung_send_after_grace() {
    let reg = Arc::new(Registry::default());
    let exporter = FakeExporter::new(Behavior::Hang);
    let mut s = settings();
    s.timeout = Duration::from_secs(60);
    s.shutdown_grace = Duration::from_secs(2);

    let handle = Scheduler::new(Arc::clone(&reg), s, dests(&exporter)).spawn(CancellationToken::new());
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(exporter.attempts(), 1);

    let started = Instant::now();
    handle.shutdown().await;
    let waited = started.elapsed();

    assert!(waited >= Duration::from_secs(2), "{waited:?}");
    assert!(waited < Duration::from_secs(3), "{waited:?}");
    assert_eq!(self_metric(&reg, FAILURES_METER), 0);
}

#[tokio::test(start_paused = true)]
async fn external_cancel_stops_loops() {
    let reg = Arc::new(Registry::default());
    let exporter = FakeExporter::new(Behavior::FailTimes(0));
    let cancel = CancellationToken::new();
    let handle = Scheduler::new(Arc::clone(&reg), settings(), dests(&exporter)).spawn(cancel.clone());

    sleep(Duration::from_millis(2_500)).await;
    cancel.cancel();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(exporter.attempts(), 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deliver_retries_until_success() {
    let exporter = FakeExporter::new(Behavior::FailTimes(2));
    deliver(exporter.as_ref(), &Snapshot::default(), &settings()).await.unwrap();
    assert_eq!(exporter.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn deliver_backs_off_exponentially() {
    let exporter = FakeExporter::new(Behavior::Fail);
    let mut s = settings();
    s.max_retries = 3;
    s.retry_backoff = Duration::from_millis(100);

    let started = Instant::now();
    let err = deliver(exporter.as_ref(), &Snapshot::default(), &s).await.unwrap_err();

    assert_eq!(err.code().as_str(), "EXPORT_DELIVERY");
    assert_eq!(exporter.attempts(), 4);
    // 100 + 200 + 400
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(700), "{waited:?}");
    assert!(waited < Duration::from_millis(750), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn deliver_times_out_stuck_attempts() {
    let exporter = FakeExporter::new(Behavior::Hang);
    let mut s = settings();
    s.timeout = Duration::from_millis(100);
    s.max_retries = 1;

    let err = deliver(exporter.as_ref(), &Snapshot::default(), &s).await.unwrap_err();
    assert_eq!(err.code().as_str(), "EXPORT_DELIVERY");
    assert!(err.to_string().contains("timed out"), "{err}");
    assert_eq!(exporter.attempts(), 2);
}

#[derive(Default)]
struct FlakyTransport {
    down: AtomicBool,
    attempts: AtomicU32,
    delivered: Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn send(&self, req: PushRequest) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(MeterError::delivery(req.exporter, "connection refused"));
        }
        self.delivered.lock().unwrap().push(serde_json::from_slice(&req.body).unwrap());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn datadog_over_failing_transport_recovers_full_delta() {
    let reg = Arc::new(Registry::default());
    reg.counter("jobs", &[]).unwrap().increment(7).unwrap();

    let transport = Arc::new(FlakyTransport::default());
    transport.down.store(true, Ordering::SeqCst);
    let cfg = DatadogSection {
        enabled: true,
        api_key: "k".into(),
        uri: "http://dd.local".into(),
        host: None,
    };
    let exporter: Arc<dyn PushExporter> =
        Arc::new(DatadogExporter::new(&cfg, Arc::clone(&transport) as Arc<dyn Transport>));
    let handle = Scheduler::new(Arc::clone(&reg), settings(), vec![exporter]).spawn(CancellationToken::new());

    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 15);
    assert_eq!(exporter_metric(&reg, FAILURES_METER, "datadog"), 5);
    assert!(transport.delivered.lock().unwrap().is_empty());

    // nothing was committed while down, so the first delivery carries all 7
    transport.down.store(false, Ordering::SeqCst);
    sleep(Duration::from_secs(1)).await;

    let delivered = transport.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    let jobs = delivered[0]["series"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["metric"] == "jobs")
        .expect("jobs series");
    assert_eq!(jobs["points"][0][1], 7.0);

    handle.shutdown().await;
}
