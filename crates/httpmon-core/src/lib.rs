//! httpmon core: error types and the shared metrics registry.
//!
//! This crate carries no runtime or transport dependencies so the registry
//! can be shared by the worker pool, the request pipeline and any reporter.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Instrumentation must never take the process down; every fallible path
//! surfaces as `HttpmonError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod metrics;

pub use error::{ErrorCode, HttpmonError, Result};
pub use metrics::{Counter, Gauge, Histogram, Meter, Metric, MetricValue, MetricsRegistry};
