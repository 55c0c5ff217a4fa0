//! Wire payloads of the push destinations, captured with a recording transport.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use meterhub_core::error::{MeterError, Result};
use meterhub_core::Registry;
use meterhub_export::config::{AzureMonitorSection, DatadogSection, ExportSection, StackdriverSection};
use meterhub_export::push::{
    build_exporters, AzureMonitorExporter, DatadogExporter, PushExporter, PushRequest, StackdriverExporter,
    Transport,
};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<PushRequest>>,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl RecordingTransport {
    fn bodies(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    fn last(&self) -> (PushRequest, Value) {
        let req = self.sent.lock().unwrap().last().cloned().expect("nothing sent");
        let body = serde_json::from_slice(&req.body).unwrap();
        (req, body)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, req: PushRequest) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MeterError::delivery(req.exporter, "HTTP 500"));
        }
        self.sent.lock().unwrap().push(req);
        Ok(())
    }
}

fn datadog(transport: &Arc<RecordingTransport>) -> DatadogExporter {
    let cfg = DatadogSection {
        enabled: true,
        api_key: "secret".into(),
        uri: "http://dd.local/".into(),
        host: Some("web-1".into()),
    };
    DatadogExporter::new(&cfg, Arc::clone(transport) as Arc<dyn Transport>)
}

fn series<'a>(body: &'a Value, metric: &str) -> Vec<&'a Value> {
    body["series"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["metric"] == metric)
        .collect()
}

fn point(s: &Value) -> f64 {
    s["points"][0][1].as_f64().unwrap()
}

#[tokio::test]
async fn datadog_counter_sends_committed_deltas() {
    let reg = Registry::default();
    let c = reg.counter("requests", &[("method", "GET")]).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let dd = datadog(&transport);

    c.increment(3).unwrap();
    dd.flush(&reg.snapshot()).await.unwrap();
    let (req, body) = transport.last();
    assert_eq!(req.url, "http://dd.local/api/v1/series");
    assert!(req.headers.contains(&("DD-API-KEY".to_string(), "secret".to_string())));
    let s = series(&body, "requests");
    assert_eq!(s[0]["type"], "count");
    assert_eq!(s[0]["host"], "web-1");
    assert_eq!(s[0]["tags"], serde_json::json!(["method:GET"]));
    assert_eq!(point(s[0]), 3.0);

    c.increment(2).unwrap();
    dd.flush(&reg.snapshot()).await.unwrap();
    assert_eq!(point(series(&transport.last().1, "requests")[0]), 2.0);

    // a failed send must not advance the baseline
    c.inc();
    transport.fail.store(true, Ordering::SeqCst);
    assert!(dd.flush(&reg.snapshot()).await.is_err());
    transport.fail.store(false, Ordering::SeqCst);
    dd.flush(&reg.snapshot()).await.unwrap();
    assert_eq!(point(series(&transport.last().1, "requests")[0]), 1.0);
}

#[tokio::test(start_paused = true)]
async fn datadog_cancelled_send_keeps_baseline() {
    let reg = Registry::default();
    let c = reg.counter("requests", &[]).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let dd = datadog(&transport);

    c.increment(4).unwrap();
    transport.delay_ms.store(1_000, Ordering::SeqCst);
    let cut = tokio::time::timeout(Duration::from_millis(100), dd.flush(&reg.snapshot())).await;
    assert!(cut.is_err());
    assert!(transport.sent.lock().unwrap().is_empty());

    // the abandoned attempt is resent in full
    transport.delay_ms.store(0, Ordering::SeqCst);
    dd.flush(&reg.snapshot()).await.unwrap();
    assert_eq!(point(series(&transport.last().1, "requests")[0]), 4.0);

    dd.flush(&reg.snapshot()).await.unwrap();
    assert_eq!(point(series(&transport.last().1, "requests")[0]), 0.0);
}

#[tokio::test]
async fn datadog_summary_sum_delta_keeps_sign() {
    let reg = Registry::default();
    let balance = reg.summary("balance", &[]).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let dd = datadog(&transport);

    balance.record(5.0);
    dd.flush(&reg.snapshot()).await.unwrap();
    assert_eq!(point(series(&transport.last().1, "balance.sum")[0]), 5.0);

    balance.record(-3.0);
    dd.flush(&reg.snapshot()).await.unwrap();
    let body = transport.last().1;
    assert_eq!(point(series(&body, "balance.sum")[0]), -3.0);
    assert_eq!(point(series(&body, "balance.count")[0]), 1.0);
    assert_eq!(point(series(&body, "balance.avg")[0]), -3.0);
}

#[tokio::test]
async fn datadog_timer_series() {
    let reg = Registry::default();
    let t = reg.timer("op", &[]).unwrap();
    for ms in [10, 20, 30] {
        t.record(Duration::from_millis(ms));
    }
    let transport = Arc::new(RecordingTransport::default());
    datadog(&transport).flush(&reg.snapshot()).await.unwrap();
    let body = &transport.bodies()[0];

    assert_eq!(point(series(body, "op.count")[0]), 3.0);
    assert!((point(series(body, "op.sum")[0]) - 0.06).abs() < 1e-9);
    assert!((point(series(body, "op.avg")[0]) - 0.02).abs() < 1e-9);
    assert!((point(series(body, "op.max")[0]) - 0.03).abs() < 1e-6);

    let pcts = series(body, "op.percentile");
    assert_eq!(pcts.len(), 3);
    assert!(pcts
        .iter()
        .any(|s| s["tags"].as_array().unwrap().iter().any(|t| t == "phi:0.5")));
}

#[tokio::test]
async fn stackdriver_batches_and_kinds() {
    let reg = Registry::default();
    for i in 0..250 {
        let worker = i.to_string();
        reg.counter("jobs", &[("worker", worker.as_str())]).unwrap().inc();
    }
    reg.gauge_value("queue.depth", &[]).unwrap().set(7.5);

    let transport = Arc::new(RecordingTransport::default());
    let cfg = StackdriverSection {
        enabled: true,
        project_id: "proj".into(),
        uri: "http://sd.local".into(),
        resource_type: "global".into(),
    };
    let sd = StackdriverExporter::new(&cfg, Arc::clone(&transport) as Arc<dyn Transport>);
    sd.flush(&reg.snapshot()).await.unwrap();

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|r| r.url == "http://sd.local/v3/projects/proj/timeSeries"));

    let bodies = transport.bodies();
    assert_eq!(bodies[0]["timeSeries"].as_array().unwrap().len(), 200);
    assert_eq!(bodies[1]["timeSeries"].as_array().unwrap().len(), 51);

    let all: Vec<&Value> = bodies
        .iter()
        .flat_map(|b| b["timeSeries"].as_array().unwrap().iter())
        .collect();

    let counter = all
        .iter()
        .find(|s| s["metric"]["type"] == "custom.googleapis.com/jobs")
        .unwrap();
    assert_eq!(counter["metricKind"], "CUMULATIVE");
    assert_eq!(counter["valueType"], "INT64");
    assert_eq!(counter["points"][0]["value"]["int64Value"], "1");
    assert!(counter["points"][0]["interval"]["startTime"].is_string());
    assert_eq!(counter["resource"]["labels"]["project_id"], "proj");

    let gauge = all
        .iter()
        .find(|s| s["metric"]["type"] == "custom.googleapis.com/queue.depth")
        .unwrap();
    assert_eq!(gauge["metricKind"], "GAUGE");
    assert_eq!(gauge["points"][0]["value"]["doubleValue"], 7.5);
    assert!(gauge["points"][0]["interval"].get("startTime").is_none());
}

#[tokio::test]
async fn azure_timer_in_milliseconds() {
    let reg = Registry::default();
    let t = reg.timer("op", &[("region", "eu")]).unwrap();
    for ms in [10, 20, 30] {
        t.record(Duration::from_millis(ms));
    }

    let transport = Arc::new(RecordingTransport::default());
    let cfg = AzureMonitorSection {
        enabled: true,
        instrumentation_key: "ab-cd".into(),
        uri: "http://ai.local".into(),
    };
    let az = AzureMonitorExporter::new(&cfg, Arc::clone(&transport) as Arc<dyn Transport>);
    az.flush(&reg.snapshot()).await.unwrap();

    let (req, body) = transport.last();
    assert_eq!(req.url, "http://ai.local/v2/track");
    let env = &body[0];
    assert_eq!(env["name"], "Microsoft.ApplicationInsights.abcd.Metric");
    assert_eq!(env["iKey"], "ab-cd");
    assert_eq!(env["data"]["baseType"], "MetricData");

    let base = &env["data"]["baseData"];
    assert_eq!(base["properties"]["region"], "eu");
    let m = &base["metrics"][0];
    assert_eq!(m["kind"], 1);
    assert_eq!(m["count"], 3);
    assert!((m["value"].as_f64().unwrap() - 60.0).abs() < 1e-6);
    assert!((m["max"].as_f64().unwrap() - 30.0).abs() < 1e-3);

    // nothing new recorded: next step carries zero deltas
    az.flush(&reg.snapshot()).await.unwrap();
    let m = &transport.last().1[0]["data"]["baseData"]["metrics"][0];
    assert_eq!(m["count"], 0);
}

#[tokio::test]
async fn azure_summary_value_follows_negative_sum() {
    let reg = Registry::default();
    let balance = reg.summary("balance", &[]).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let cfg = AzureMonitorSection {
        enabled: true,
        instrumentation_key: "k".into(),
        uri: "http://ai.local".into(),
    };
    let az = AzureMonitorExporter::new(&cfg, Arc::clone(&transport) as Arc<dyn Transport>);

    balance.record(5.0);
    az.flush(&reg.snapshot()).await.unwrap();
    balance.record(-3.0);
    az.flush(&reg.snapshot()).await.unwrap();

    let m = &transport.last().1[0]["data"]["baseData"]["metrics"][0];
    assert_eq!(m["value"], -3.0);
    assert_eq!(m["count"], 1);
}

#[test]
fn build_exporters_follows_enabled_flags() {
    let mut cfg = ExportSection::default();
    let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::default());
    assert!(build_exporters(&cfg, Arc::clone(&transport)).is_empty());

    cfg.datadog.enabled = true;
    cfg.log.enabled = true;
    let names: Vec<&str> = build_exporters(&cfg, transport).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["datadog", "log"]);
}
