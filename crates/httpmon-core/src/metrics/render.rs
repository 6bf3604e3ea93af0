//! Prometheus text exposition.
//!
//! Registry names use dots and dashes (`http-server.2xx-responses`); they are
//! flattened to `[a-zA-Z0-9_:]` here. Histogram bounds stay in integer
//! microseconds, so histogram names carry an explicit `_micros` suffix.

use std::fmt::Write;

use super::types::Metric;

/// Map a registry name to a valid Prometheus metric name.
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".to_string() } else { "-Inf".to_string() }
    } else {
        v.to_string()
    }
}

pub(crate) fn render_metric(name: &str, metric: &Metric, out: &mut String) {
    let name = sanitize_name(name);
    match metric {
        Metric::Counter(c) => {
            let _ = writeln!(out, "# TYPE {name} counter\n{name} {}", c.get());
        }
        Metric::Gauge(g) => {
            let _ = writeln!(out, "# TYPE {name} gauge\n{name} {}", fmt_float(g.value()));
        }
        Metric::Histogram(h) => {
            let s = h.snapshot();
            let name = format!("{name}_micros");
            let _ = writeln!(out, "# TYPE {name} histogram");
            for (le, count) in &s.buckets {
                let _ = writeln!(out, "{name}_bucket{{le=\"{le}\"}} {count}");
            }
            let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {}", s.count);
            let _ = writeln!(out, "{name}_sum {}", s.sum_micros);
            let _ = writeln!(out, "{name}_count {}", s.count);
        }
        Metric::Meter(m) => {
            let _ = writeln!(out, "# TYPE {name}_total counter\n{name}_total {}", m.count());
            let _ = writeln!(
                out,
                "# TYPE {name}_rate_1m gauge\n{name}_rate_1m {}",
                fmt_float(m.one_minute_rate())
            );
            let _ = writeln!(
                out,
                "# TYPE {name}_rate_mean gauge\n{name}_rate_mean {}",
                fmt_float(m.mean_rate())
            );
        }
    }
}
