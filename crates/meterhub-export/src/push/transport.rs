//! Network seam for push exporters.
//!
//! Exporters encode a `PushRequest`; a `Transport` ships it. The HTTP
//! transport is a thin reqwest wrapper; tests swap in failing or recording
//! transports.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use meterhub_core::error::{MeterError, Result};

/// Encoded payload for one destination call.
#[derive(Debug, Clone)]
pub struct PushRequest {
    /// Exporter name, used for error reporting.
    pub exporter: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub content_type: &'static str,
    pub body: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: PushRequest) -> Result<()>;
}

/// HTTP POST transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: PushRequest) -> Result<()> {
        let mut builder = self
            .client
            .post(&req.url)
            .header(reqwest::header::CONTENT_TYPE, req.content_type);
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        let response = builder
            .body(req.body)
            .send()
            .await
            .map_err(|e| MeterError::delivery(req.exporter, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(MeterError::delivery(req.exporter, format!("server returned HTTP {}", status.as_u16())))
        }
    }
}
