//! Request pipeline decorator: results, errors and timing.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use tower::{service_fn, Layer, ServiceExt};

use httpmon_core::{Metric, MetricsRegistry};
use httpmon_server::instrument::InstrumentedLayer;

#[derive(Debug, Clone, PartialEq)]
struct HandlerError {
    code: u32,
    msg: &'static str,
}

fn active(reg: &MetricsRegistry) -> f64 {
    match reg.get("http-server.active-requests") {
        Some(Metric::Gauge(g)) => g.value(),
        other => panic!("unexpected {other:?}"),
    }
}

fn durations(reg: &MetricsRegistry) -> (u64, u64) {
    match reg.get("http-server.request-duration") {
        Some(Metric::Histogram(h)) => {
            let s = h.snapshot();
            (s.count, s.max_micros)
        }
        other => panic!("unexpected {other:?}"),
    }
}

fn requests(reg: &MetricsRegistry) -> u64 {
    match reg.get("http-server.requests") {
        Some(Metric::Meter(m)) => m.count(),
        other => panic!("unexpected {other:?}"),
    }
}

async fn handler(req: u32) -> Result<String, HandlerError> {
    if req == 0 {
        return Err(HandlerError { code: 42, msg: "zero" });
    }
    tokio::time::sleep(Duration::from_millis(2)).await;
    Ok(format!("got {req}"))
}

#[tokio::test]
async fn success_is_identical_and_recorded() {
    let reg = MetricsRegistry::new();
    let layer = InstrumentedLayer::new(&reg, "http-server").unwrap();
    let svc = layer.layer(service_fn(handler));

    let direct = handler(5).await;
    let wrapped = svc.oneshot(5).await;

    assert_eq!(wrapped, direct);
    assert_eq!(active(&reg), 0.0);
    let (count, max) = durations(&reg);
    assert_eq!(count, 1);
    assert!(max >= 2_000);
    assert_eq!(requests(&reg), 1);
}

#[tokio::test]
async fn errors_pass_through_untouched() {
    let reg = MetricsRegistry::new();
    let layer = InstrumentedLayer::new(&reg, "http-server").unwrap();
    let svc = layer.layer(service_fn(handler));

    let err = svc.oneshot(0).await.unwrap_err();

    assert_eq!(err, HandlerError { code: 42, msg: "zero" });
    assert_eq!(active(&reg), 0.0);
    assert_eq!(durations(&reg).0, 1);
    assert_eq!(requests(&reg), 1);
}

#[tokio::test]
async fn in_flight_gauge_tracks_pending_requests() {
    let reg = MetricsRegistry::new();
    let layer = InstrumentedLayer::new(&reg, "http-server").unwrap();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release_rx = std::sync::Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

    let svc = layer.layer(service_fn(move |_req: ()| {
        let rx = std::sync::Arc::clone(&release_rx);
        async move {
            if let Some(rx) = rx.lock().await.take() {
                let _ = rx.await;
            }
            Ok::<_, HandlerError>(())
        }
    }));

    let pending = tokio::spawn(svc.oneshot(()));
    tokio::time::timeout(Duration::from_secs(5), async {
        while active(&reg) < 1.0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request never became active");

    release_tx.send(()).unwrap();
    pending.await.unwrap().unwrap();
    assert_eq!(active(&reg), 0.0);
}

#[tokio::test]
async fn dropped_request_future_still_settles_gauge() {
    let reg = MetricsRegistry::new();
    let layer = InstrumentedLayer::new(&reg, "http-server").unwrap();
    let svc = layer.layer(service_fn(|_req: ()| async {
        std::future::pending::<Result<(), HandlerError>>().await
    }));

    let fut = svc.oneshot(());
    let timed_out = tokio::time::timeout(Duration::from_millis(10), fut).await;

    assert!(timed_out.is_err());
    assert_eq!(active(&reg), 0.0);
    assert_eq!(durations(&reg).0, 1);
}

#[test]
fn layer_registration_is_one_shot_per_prefix() {
    let reg = MetricsRegistry::new();
    InstrumentedLayer::new(&reg, "http-server").unwrap();
    let err = InstrumentedLayer::new(&reg, "http-server").err().expect("duplicate");
    assert_eq!(err.code().as_str(), "DUPLICATE_METRIC_NAME");
    assert!(InstrumentedLayer::new(&reg, "admin-server").is_ok());
}
