//! Operational HTTP endpoints.
//!
//! - `/healthz`       : liveness
//! - `/metrics`       : Prometheus text format (path configurable)
//! - `/metrics.json`  : JSON (path configurable, off by default)

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use meterhub_core::render::{render_json, render_prometheus, JSON_CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE};

use crate::app_state::AppState;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn prometheus(State(state): State<AppState>) -> Response {
    let body = render_prometheus(&state.registry().snapshot());
    (StatusCode::OK, [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}

pub async fn json(State(state): State<AppState>) -> Response {
    let body = render_json(&state.registry().snapshot());
    (StatusCode::OK, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
}
