//! Lightweight in-process metrics registry.
//!
//! Counters, gauges, histograms and meters are stored as atomics behind
//! `Arc` handles. Components register them by name at startup and record
//! through the handles; readers poll via `render_prometheus` or `snapshot`.

pub mod registry;
pub mod render;
pub mod snapshot;
pub mod types;

pub use registry::MetricsRegistry;
pub use snapshot::MetricValue;
pub use types::{Counter, Gauge, Histogram, HistogramSnapshot, Meter, Metric, BUCKETS_MICROS};
