//! Metric handle types.
//!
//! All handles are lock-free on the hot path (atomics only). The meter takes a
//! mutex once per elapsed tick interval to fold its moving average, and only
//! the thread that wins the tick race does so.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

type PollFn = Box<dyn Fn() -> f64 + Send + Sync>;

enum GaugeSource {
    Value(AtomicI64),
    Polled(PollFn),
}

/// Instantaneous value, either held in an atomic or computed on read.
pub struct Gauge {
    source: GaugeSource,
}

impl Gauge {
    /// Gauge holding a signed value updated with `set`/`inc`/`dec`.
    pub fn new() -> Self {
        Self {
            source: GaugeSource::Value(AtomicI64::new(0)),
        }
    }

    /// Gauge whose value is computed by `f` every time it is read.
    pub fn polled<F>(f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self {
            source: GaugeSource::Polled(Box::new(f)),
        }
    }

    pub fn is_polled(&self) -> bool {
        matches!(self.source, GaugeSource::Polled(_))
    }

    /// Increment by 1. No effect on polled gauges.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Decrement by 1. No effect on polled gauges.
    pub fn dec(&self) {
        self.add(-1);
    }

    /// Add a signed delta. No effect on polled gauges.
    pub fn add(&self, v: i64) {
        if let GaugeSource::Value(a) = &self.source {
            a.fetch_add(v, Ordering::Relaxed);
        }
    }

    /// Overwrite the held value. No effect on polled gauges.
    pub fn set(&self, v: i64) {
        if let GaugeSource::Value(a) = &self.source {
            a.store(v, Ordering::Relaxed);
        }
    }

    /// Current value (polled gauges evaluate their closure here).
    pub fn value(&self) -> f64 {
        match &self.source {
            GaugeSource::Value(a) => a.load(Ordering::Relaxed) as f64,
            GaugeSource::Polled(f) => f(),
        }
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_polled() { "polled" } else { "value" };
        f.debug_struct("Gauge").field("kind", &kind).finish()
    }
}

// Fixed Buckets in Microseconds (µs)
// 100us, 500us, 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s
pub const BUCKETS_MICROS: [u64; 9] = [
    100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000,
];

/// Duration distribution with fixed cumulative buckets (microsecond scale).
#[derive(Debug, Default)]
pub struct Histogram {
    count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MICROS.len()],
}

/// Point-in-time copy of a histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_micros: u64,
    pub max_micros: u64,
    /// `(upper bound in micros, cumulative count)` for each fixed bucket.
    pub buckets: Vec<(u64, u64)>,
}

impl HistogramSnapshot {
    pub fn mean_micros(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_micros as f64 / self.count as f64
        }
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, duration: Duration) {
        self.observe_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX));
    }

    pub fn observe_micros(&self, micros: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.max.fetch_max(micros, Ordering::Relaxed);

        // Cumulative: every bucket whose bound covers the value.
        for (i, &b) in BUCKETS_MICROS.iter().enumerate() {
            if micros <= b {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum_micros: self.sum.load(Ordering::Relaxed),
            max_micros: self.max.load(Ordering::Relaxed),
            buckets: BUCKETS_MICROS
                .iter()
                .zip(self.buckets.iter())
                .map(|(&le, c)| (le, c.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const ONE_MINUTE_SECS: f64 = 60.0;

#[derive(Debug, Default)]
struct Ewma {
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn alpha() -> f64 {
        1.0 - (-TICK_INTERVAL.as_secs_f64() / ONE_MINUTE_SECS).exp()
    }

    fn tick(&mut self, count: u64) {
        let instant_rate = count as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += Self::alpha() * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

/// Event counter that also reports rates (events per second).
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    uncounted: AtomicU64,
    start: Instant,
    // Nanos since `start` of the last folded tick.
    last_tick: AtomicU64,
    ewma: Mutex<Ewma>,
    ewma_poisoned: AtomicBool,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            uncounted: AtomicU64::new(0),
            start: Instant::now(),
            last_tick: AtomicU64::new(0),
            ewma: Mutex::new(Ewma::default()),
            ewma_poisoned: AtomicBool::new(false),
        }
    }
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event.
    pub fn mark(&self) {
        self.mark_n(1);
    }

    /// Record `n` events.
    pub fn mark_n(&self, n: u64) {
        self.tick_if_necessary();
        self.count.fetch_add(n, Ordering::Relaxed);
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean events per second since creation.
    pub fn mean_rate(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.count() as f64 / elapsed
    }

    /// Exponentially weighted events per second over roughly the last minute.
    pub fn one_minute_rate(&self) -> f64 {
        self.tick_if_necessary();
        match self.ewma.lock() {
            Ok(e) => e.rate,
            Err(_) => 0.0,
        }
    }

    fn tick_if_necessary(&self) {
        let interval = TICK_INTERVAL.as_nanos() as u64;
        let now = u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let old = self.last_tick.load(Ordering::Acquire);
        let age = now.saturating_sub(old);
        if age < interval {
            return;
        }
        let new_tick = now - age % interval;
        if self
            .last_tick
            .compare_exchange(old, new_tick, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // Another thread folds this interval.
            return;
        }
        let ticks = age / interval;
        match self.ewma.lock() {
            Ok(mut e) => {
                let pending = self.uncounted.swap(0, Ordering::Relaxed);
                e.tick(pending);
                for _ in 1..ticks {
                    e.tick(0);
                }
            }
            Err(_) => {
                if !self.ewma_poisoned.swap(true, Ordering::Relaxed) {
                    tracing::error!("meter rate state poisoned; one-minute rate frozen");
                }
            }
        }
    }
}

/// A registered metric handle.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
}

impl Metric {
    /// Kind name used in errors and exposition.
    pub fn kind(&self) -> &'static str {
        match self {
            Metric::Counter(_) => "counter",
            Metric::Gauge(_) => "gauge",
            Metric::Histogram(_) => "histogram",
            Metric::Meter(_) => "meter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_are_cumulative() {
        let h = Histogram::new();
        h.observe(Duration::from_micros(50));
        h.observe(Duration::from_micros(700));
        h.observe(Duration::from_secs(2));

        let s = h.snapshot();
        assert_eq!(s.count, 3);
        assert_eq!(s.max_micros, 2_000_000);
        assert_eq!(s.buckets[0], (100, 1));
        assert_eq!(s.buckets[2], (1_000, 2));
        assert_eq!(s.buckets[8], (1_000_000, 2));
    }

    #[test]
    fn value_gauge_moves_and_polled_gauge_ignores_writes() {
        let g = Gauge::new();
        g.inc();
        g.inc();
        g.dec();
        assert_eq!(g.value(), 1.0);

        let p = Gauge::polled(|| 42.0);
        p.set(7);
        assert_eq!(p.value(), 42.0);
    }

    #[test]
    fn ewma_first_tick_takes_instant_rate() {
        let mut e = Ewma::default();
        e.tick(50);
        assert!((e.rate - 10.0).abs() < f64::EPSILON);
        e.tick(0);
        assert!(e.rate < 10.0 && e.rate > 0.0);
    }

    #[test]
    fn meter_counts_marks() {
        let m = Meter::new();
        m.mark();
        m.mark_n(4);
        assert_eq!(m.count(), 5);
        assert!(m.mean_rate() >= 0.0);
    }
}
