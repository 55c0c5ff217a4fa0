//! meterhub core: instrument registry, decaying histograms, filters, and
//! pull renderers.
//!
//! This crate carries no transport or runtime dependencies so the same engine
//! can back an HTTP scrape endpoint, a push exporter, or an embedded
//! application that only reads snapshots.
//!
//! Data flow: application code asks the [`Registry`] for a handle (the filter
//! chain runs once per raw identity), records into it, and exporters read a
//! [`Snapshot`] on demand.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Fast-path misuse (negative deltas, kind conflicts) is returned to the
//! caller; render problems are isolated per instrument and logged.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod clock;
pub mod error;
pub mod filter;
pub mod histogram;
pub mod id;
pub mod instrument;
pub mod registry;
pub mod render;
pub mod snapshot;

/// Shared result type.
pub use error::{ErrorCode, MeterError, Result};
pub use filter::{FilterChain, FilterReply, MeterFilter};
pub use id::{MeterId, MeterKind, Tag};
pub use instrument::{Counter, DistributionSample, Gauge, Instrument, Summary, Timer, TimerSample};
pub use registry::{Registry, RegistrySettings};
pub use snapshot::{MeterSample, Sample, Snapshot};
