//! Axum router wiring.
//!
//! `/healthz` is always served; the Prometheus and JSON scrape routes follow
//! `server.prometheus` / `server.json`. Config validation keeps those paths
//! literal and distinct from `/healthz`, so route registration cannot clash.

use axum::{routing::get, Router};

use crate::{app_state::AppState, config::HEALTHZ_PATH, ops};

pub fn build_router(state: AppState) -> Router {
    let server = &state.cfg().server;
    let mut router = Router::new().route(HEALTHZ_PATH, get(ops::healthz));

    if server.prometheus.enabled {
        router = router.route(&server.prometheus.path, get(ops::prometheus));
    }
    if server.json.enabled {
        router = router.route(&server.json.path, get(ops::json));
    }

    router.with_state(state)
}
