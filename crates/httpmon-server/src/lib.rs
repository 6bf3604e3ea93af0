//! httpmon server library entry.
//!
//! Metrics instrumentation for an HTTP server's execution substrate: a
//! fixed-size worker pool with per-job context cleanup, a transparent
//! request-pipeline decorator, a status-class counting request log, and
//! process-level runtime gauges. All of it records into one shared
//! `MetricsRegistry`.

pub mod app_state;
pub mod config;
pub mod context;
pub mod handlers;
pub mod instrument;
pub mod ops;
pub mod pool;
pub mod router;
pub mod runtime;
