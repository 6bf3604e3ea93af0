//! Status-class counting request log.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use tower::{service_fn, Layer, ServiceExt};

use httpmon_core::{Metric, MetricsRegistry};
use httpmon_server::instrument::{
    CompletedRequest, NoopRequestLog, RequestLog, RequestLogLayer, StatusClass, StatusCodeMetrics,
};

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<CompletedRequest>>,
}

impl RequestLog for Recording {
    fn log(&self, event: &CompletedRequest) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn event(status: u16) -> CompletedRequest {
    CompletedRequest {
        method: "GET".into(),
        path: format!("/r/{status}"),
        status,
        elapsed: Duration::from_micros(status as u64),
        request_id: Some(format!("id-{status}")),
    }
}

fn count(reg: &MetricsRegistry, name: &str) -> Option<u64> {
    match reg.get(name) {
        Some(Metric::Counter(c)) => Some(c.get()),
        None => None,
        other => panic!("{name}: unexpected {other:?}"),
    }
}

#[test]
fn classes_counted_and_events_forwarded_in_order() {
    let reg = Arc::new(MetricsRegistry::new());
    let sink = Arc::new(Recording::default());
    let log = StatusCodeMetrics::new(Arc::clone(&sink), Arc::clone(&reg), "http-server");

    let sent: Vec<CompletedRequest> = [200, 301, 404, 500, 201].into_iter().map(event).collect();
    for e in &sent {
        log.log(e);
    }

    assert_eq!(count(&reg, "http-server.2xx-responses"), Some(2));
    assert_eq!(count(&reg, "http-server.3xx-responses"), Some(1));
    assert_eq!(count(&reg, "http-server.4xx-responses"), Some(1));
    assert_eq!(count(&reg, "http-server.5xx-responses"), Some(1));
    // Never observed, never created.
    assert_eq!(count(&reg, "http-server.1xx-responses"), None);
    assert_eq!(count(&reg, "http-server.other-responses"), None);

    assert_eq!(*sink.events.lock().unwrap(), sent);
}

#[test]
fn out_of_range_codes_are_other() {
    let reg = Arc::new(MetricsRegistry::new());
    let log = StatusCodeMetrics::new(NoopRequestLog, Arc::clone(&reg), "http-server");
    for code in [0, 99, 600, 999, 102] {
        log.log(&event(code));
    }
    assert_eq!(count(&reg, "http-server.other-responses"), Some(4));
    assert_eq!(count(&reg, "http-server.1xx-responses"), Some(1));
}

#[test]
fn exact_codes_are_optional() {
    let reg = Arc::new(MetricsRegistry::new());
    let log = StatusCodeMetrics::new(NoopRequestLog, Arc::clone(&reg), "api").with_exact_codes();
    for code in [404, 404, 418] {
        log.log(&event(code));
    }
    assert_eq!(count(&reg, "api.4xx-responses"), Some(3));
    assert_eq!(count(&reg, "api.responses.404"), Some(2));
    assert_eq!(count(&reg, "api.responses.418"), Some(1));
}

#[test]
fn concurrent_completions_are_counted_exactly() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 5_000;
    let codes = [200u16, 204, 302, 404, 503];

    let reg = Arc::new(MetricsRegistry::new());
    let log = Arc::new(StatusCodeMetrics::new(NoopRequestLog, Arc::clone(&reg), "http-server"));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let code = codes[((t + i) % codes.len() as u64) as usize];
                    log.log(&event(code));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = THREADS * PER_THREAD;
    let per_code = total / codes.len() as u64;
    assert_eq!(count(&reg, "http-server.2xx-responses"), Some(2 * per_code));
    assert_eq!(count(&reg, "http-server.3xx-responses"), Some(per_code));
    assert_eq!(count(&reg, "http-server.4xx-responses"), Some(per_code));
    assert_eq!(count(&reg, "http-server.5xx-responses"), Some(per_code));
}

#[test]
fn class_names_follow_prefix() {
    assert_eq!(StatusClass::of(204).metric_name("edge"), "edge.2xx-responses");
    assert_eq!(StatusClass::of(7).metric_name("edge"), "edge.other-responses");
}

#[tokio::test]
async fn request_log_layer_reports_http_exchanges() {
    let sink = Arc::new(Recording::default());
    let layer = RequestLogLayer::from_shared(Arc::clone(&sink));
    let svc = layer.layer(service_fn(|req: Request<Body>| async move {
        let status = if req.uri().path() == "/missing" {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::OK
        };
        Ok::<_, std::convert::Infallible>(
            Response::builder().status(status).body(Body::empty()).unwrap(),
        )
    }));

    let req = Request::builder()
        .method("DELETE")
        .uri("/missing?x=1")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let resp = svc.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let events = sink.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].method, "DELETE");
    assert_eq!(events[0].path, "/missing");
    assert_eq!(events[0].status, 404);
    assert_eq!(events[0].request_id.as_deref(), Some("abc-123"));
}

#[tokio::test]
async fn request_log_layer_skips_inner_errors() {
    #[derive(Debug, PartialEq)]
    struct Broken;

    let sink = Arc::new(Recording::default());
    let layer = RequestLogLayer::from_shared(Arc::clone(&sink));
    let svc = layer.layer(service_fn(|_req: Request<Body>| async {
        Err::<Response<Body>, _>(Broken)
    }));

    let err = svc.oneshot(Request::new(Body::empty())).await.unwrap_err();
    assert_eq!(err, Broken);
    assert!(sink.events.lock().unwrap().is_empty());
}
