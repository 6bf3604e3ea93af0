//! Process-wide named metric store.
//!
//! Created once at startup and shared via `Arc` by every component that
//! records metrics. Names are unique; the first registration of a name wins
//! and any later one fails with `DuplicateMetricName`. Storage is a sharded
//! `DashMap`, so unrelated names never serialize on a global lock.
//!
//! Entries are keyed by their Prometheus exposition name. Two names that
//! flatten to the same exposition name (`a.b`, `a-b`) collide at
//! registration instead of rendering as duplicate series.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{HttpmonError, Result};

use super::render;
use super::snapshot::MetricValue;
use super::types::{Counter, Gauge, Histogram, Meter, Metric};

#[derive(Debug)]
struct Registered {
    name: String,
    metric: Metric,
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: DashMap<String, Registered>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
        }
    }

    /// Register `metric` under `name`. Fails if the name, or another name
    /// with the same exposition name, is taken.
    pub fn register(&self, name: impl Into<String>, metric: Metric) -> Result<()> {
        let name = name.into();
        match self.metrics.entry(render::sanitize_name(&name)) {
            Entry::Occupied(o) => {
                if o.get().name != name {
                    tracing::warn!(%name, taken_by = %o.get().name, "exposition name collision");
                }
                Err(HttpmonError::DuplicateMetricName(name))
            }
            Entry::Vacant(v) => {
                tracing::debug!(%name, kind = metric.kind(), "metric registered");
                v.insert(Registered { name, metric });
                Ok(())
            }
        }
    }

    /// Register a batch, all or nothing. On the first collision every name
    /// this call already inserted is removed again and the error returned.
    pub fn register_all(&self, batch: Vec<(String, Metric)>) -> Result<()> {
        let mut inserted: Vec<String> = Vec::with_capacity(batch.len());
        for (name, metric) in batch {
            if let Err(e) = self.register(name.clone(), metric) {
                for n in &inserted {
                    self.metrics.remove(&render::sanitize_name(n));
                }
                return Err(e);
            }
            inserted.push(name);
        }
        Ok(())
    }

    pub fn register_counter(&self, name: impl Into<String>) -> Result<Arc<Counter>> {
        let c = Arc::new(Counter::new());
        self.register(name, Metric::Counter(Arc::clone(&c)))?;
        Ok(c)
    }

    pub fn register_gauge(&self, name: impl Into<String>) -> Result<Arc<Gauge>> {
        let g = Arc::new(Gauge::new());
        self.register(name, Metric::Gauge(Arc::clone(&g)))?;
        Ok(g)
    }

    /// Register a gauge computed by `f` whenever it is read.
    pub fn register_polled_gauge<F>(&self, name: impl Into<String>, f: F) -> Result<Arc<Gauge>>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let g = Arc::new(Gauge::polled(f));
        self.register(name, Metric::Gauge(Arc::clone(&g)))?;
        Ok(g)
    }

    pub fn register_histogram(&self, name: impl Into<String>) -> Result<Arc<Histogram>> {
        let h = Arc::new(Histogram::new());
        self.register(name, Metric::Histogram(Arc::clone(&h)))?;
        Ok(h)
    }

    pub fn register_meter(&self, name: impl Into<String>) -> Result<Arc<Meter>> {
        let m = Arc::new(Meter::new());
        self.register(name, Metric::Meter(Arc::clone(&m)))?;
        Ok(m)
    }

    /// Get-or-create a counter. Idempotent for counters; fails only if the
    /// name is held by another kind of metric.
    pub fn counter(&self, name: &str) -> Result<Arc<Counter>> {
        let key = render::sanitize_name(name);
        if let Some(r) = self.metrics.get(&key) {
            return as_counter(name, r.value());
        }
        let entry = self.metrics.entry(key).or_insert_with(|| Registered {
            name: name.to_string(),
            metric: Metric::Counter(Arc::new(Counter::new())),
        });
        as_counter(name, entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics
            .get(&render::sanitize_name(name))
            .filter(|r| r.name == name)
            .map(|r| r.metric.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Handles sorted by name. Cloned out of the map so polled gauges are
    /// evaluated without holding any shard lock.
    fn sorted(&self) -> Vec<(String, Metric)> {
        let mut all: Vec<(String, Metric)> = self
            .metrics
            .iter()
            .map(|e| (e.name.clone(), e.metric.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Render every metric in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, metric) in self.sorted() {
            render::render_metric(&name, &metric, &mut out);
        }
        out
    }

    /// Serializable point-in-time view of every metric.
    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        self.sorted()
            .into_iter()
            .map(|(name, metric)| (name, MetricValue::from(&metric)))
            .collect()
    }
}

fn as_counter(name: &str, entry: &Registered) -> Result<Arc<Counter>> {
    if entry.name != name {
        return Err(HttpmonError::DuplicateMetricName(name.to_string()));
    }
    match &entry.metric {
        Metric::Counter(c) => Ok(Arc::clone(c)),
        _ => Err(HttpmonError::MetricKindMismatch {
            name: name.to_string(),
            expected: "counter",
        }),
    }
}
