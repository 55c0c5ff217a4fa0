//! Pull-side renderers.
//!
//! Both renderers isolate failures per instrument: a sample that cannot be
//! rendered is logged and skipped, and the rest of the response is produced.

pub mod json;
pub mod prometheus;

pub use json::render as render_json;
pub use prometheus::render as render_prometheus;

/// Prometheus text exposition content type.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
/// JSON content type.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// `p` as a short label: 0.5 -> "50", 0.999 -> "99.9".
pub(crate) fn percentile_label(p: f64) -> String {
    let tenths = (p * 1000.0).round() / 10.0;
    format!("{tenths}")
}
