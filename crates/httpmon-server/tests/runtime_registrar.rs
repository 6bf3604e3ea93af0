//! Runtime gauge registrar lifecycle.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use httpmon_core::{Metric, MetricsRegistry};
use httpmon_server::runtime::{RuntimeMetrics, RUNTIME_GAUGES};

#[test]
fn registers_every_gauge_once() {
    let reg = MetricsRegistry::new();
    RuntimeMetrics::register(&reg).unwrap();

    for name in RUNTIME_GAUGES {
        match reg.get(name) {
            Some(Metric::Gauge(g)) => assert!(g.is_polled(), "{name} should be polled"),
            other => panic!("{name}: unexpected {other:?}"),
        }
    }
    assert_eq!(reg.len(), RUNTIME_GAUGES.len());
}

#[test]
fn second_registration_fails_and_keeps_first() {
    let reg = MetricsRegistry::new();
    RuntimeMetrics::register(&reg).unwrap();
    let before = reg.names();

    let err = RuntimeMetrics::register(&reg).expect_err("second call must fail");
    assert_eq!(err.code().as_str(), "DUPLICATE_METRIC_NAME");
    assert_eq!(reg.names(), before);

    match reg.get("process.uptime") {
        Some(Metric::Gauge(g)) => assert!(g.value() >= 0.0),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn collision_with_foreign_metric_registers_nothing() {
    let reg = MetricsRegistry::new();
    reg.register_counter("threads.count").unwrap();

    let err = RuntimeMetrics::register(&reg).expect_err("taken name");
    assert_eq!(err.to_string(), "duplicate metric name: threads.count");
    assert_eq!(reg.len(), 1);
}

#[test]
fn collision_on_last_name_rolls_back_the_batch() {
    let reg = MetricsRegistry::new();
    let last = RUNTIME_GAUGES[RUNTIME_GAUGES.len() - 1];
    reg.register_counter(last).unwrap();

    let err = RuntimeMetrics::register(&reg).expect_err("taken name");
    assert_eq!(err.to_string(), format!("duplicate metric name: {last}"));
    assert_eq!(reg.names(), vec![last.to_string()]);
}

fn gauge(reg: &MetricsRegistry, name: &str) -> f64 {
    match reg.get(name) {
        Some(Metric::Gauge(g)) => g.value(),
        other => panic!("{name}: unexpected {other:?}"),
    }
}

#[test]
fn thread_states_add_up_to_thread_count() {
    const STATES: [&str; 6] = [
        "threads.running",
        "threads.sleeping",
        "threads.blocked",
        "threads.idle",
        "threads.zombie",
        "threads.other",
    ];

    let reg = MetricsRegistry::new();
    RuntimeMetrics::register(&reg).unwrap();

    // Gauges share one sample per refresh interval; a read that straddles a
    // refresh can see two different samples, so retry a few times.
    let consistent = (0..5).any(|_| {
        let count = gauge(&reg, "threads.count");
        let sum: f64 = STATES.iter().map(|n| gauge(&reg, n)).sum();
        count == sum
    });
    assert!(consistent, "per-state thread gauges never matched threads.count");
}
