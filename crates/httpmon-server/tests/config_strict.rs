#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use httpmon_server::config::{self, QueueFull};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
server:
  listen: "0.0.0.0:8080"
  queue_sise: 64 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config_uses_defaults() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.server.threads, 32);
    assert_eq!(cfg.server.queue_size, 128);
    assert_eq!(cfg.server.queue_full, QueueFull::Reject);
    assert_eq!(cfg.server.pool_name, "default-pool");
    assert_eq!(cfg.metrics.prefix, "http-server");
    assert!(!cfg.metrics.exact_status_codes);
    assert!(cfg.metrics.runtime_gauges);
}

#[test]
fn full_config_round_trips_values() {
    let ok = r#"
version: 1
server:
  listen: "127.0.0.1:9000"
  threads: 4
  queue_size: 16
  queue_full: block
  pool_name: "api-pool"
metrics:
  prefix: "edge"
  exact_status_codes: true
  runtime_gauges: false
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.server.threads, 4);
    assert_eq!(cfg.server.queue_full, QueueFull::Block);
    assert_eq!(cfg.metrics.prefix, "edge");
    assert!(cfg.metrics.exact_status_codes);
}

#[test]
fn out_of_range_values_are_rejected() {
    for bad in [
        "version: 1\nserver: { threads: 0 }\n",
        "version: 1\nserver: { queue_size: 0 }\n",
        "version: 1\nmetrics: { prefix: \"\" }\n",
        "version: 1\nmetrics: { prefix: \"has space\" }\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.code().as_str(), "BAD_CONFIG", "{bad}");
    }
}

#[test]
fn unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let cfg = config::load_or_default("/nonexistent/httpmon.yaml").expect("defaults");
    assert_eq!(cfg.version, 1);
}
