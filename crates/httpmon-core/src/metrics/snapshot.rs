//! Serializable metric values (JSON exposition).

use serde::Serialize;

use super::types::Metric;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricValue {
    Counter {
        count: u64,
    },
    Gauge {
        value: f64,
    },
    Histogram {
        count: u64,
        sum_micros: u64,
        max_micros: u64,
        mean_micros: f64,
    },
    Meter {
        count: u64,
        mean_rate: f64,
        one_minute_rate: f64,
    },
}

impl From<&Metric> for MetricValue {
    fn from(m: &Metric) -> Self {
        match m {
            Metric::Counter(c) => MetricValue::Counter { count: c.get() },
            Metric::Gauge(g) => MetricValue::Gauge { value: g.value() },
            Metric::Histogram(h) => {
                let s = h.snapshot();
                MetricValue::Histogram {
                    count: s.count,
                    sum_micros: s.sum_micros,
                    max_micros: s.max_micros,
                    mean_micros: s.mean_micros(),
                }
            }
            Metric::Meter(m) => MetricValue::Meter {
                count: m.count(),
                mean_rate: m.mean_rate(),
                one_minute_rate: m.one_minute_rate(),
            },
        }
    }
}
