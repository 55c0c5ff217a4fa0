//! meterhub export library entry.
//!
//! Wires the core registry to the outside world: YAML config, the axum pull
//! endpoints, and the push exporters with their scheduler. Consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod ops;
pub mod push;
pub mod router;
pub mod scheduler;
