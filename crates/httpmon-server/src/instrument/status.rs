//! Response status accounting around the request-completion log.
//!
//! `StatusCodeMetrics` decorates any [`RequestLog`] sink: it counts the event's
//! status class, then forwards the same event to the wrapped sink. Counters
//! are created on first use and cached per class, so concurrent completions
//! touch independent atomics and never a shared lock.
//!
//! `RequestLogLayer` is the tower side: it turns each finished http exchange
//! into a [`CompletedRequest`] and hands it to a sink.

use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::http::{Request, Response};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use httpmon_core::{Counter, MetricsRegistry};

use crate::context::REQUEST_ID_HEADER;

/// One finished request, as seen by the request log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRequest {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub elapsed: Duration,
    pub request_id: Option<String>,
}

/// Sink for completed-request events.
pub trait RequestLog: Send + Sync + 'static {
    fn log(&self, event: &CompletedRequest);
}

impl<L: RequestLog + ?Sized> RequestLog for Arc<L> {
    fn log(&self, event: &CompletedRequest) {
        (**self).log(event)
    }
}

impl<L: RequestLog + ?Sized> RequestLog for Box<L> {
    fn log(&self, event: &CompletedRequest) {
        (**self).log(event)
    }
}

/// Discards every event. Stands in when no request log is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRequestLog;

impl RequestLog for NoopRequestLog {
    fn log(&self, _event: &CompletedRequest) {}
}

/// Writes each event as a structured `tracing` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRequestLog;

impl RequestLog for TracingRequestLog {
    fn log(&self, e: &CompletedRequest) {
        tracing::info!(
            target: "httpmon::access",
            method = %e.method,
            path = %e.path,
            status = e.status,
            elapsed_us = e.elapsed.as_micros() as u64,
            request_id = e.request_id.as_deref().unwrap_or("-"),
            "request completed"
        );
    }
}

const CLASS_COUNT: usize = 6;

/// Leading-digit bucket of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
    /// Anything outside 100..=599.
    Other,
}

impl StatusClass {
    pub const ALL: [StatusClass; CLASS_COUNT] = [
        StatusClass::Informational,
        StatusClass::Success,
        StatusClass::Redirection,
        StatusClass::ClientError,
        StatusClass::ServerError,
        StatusClass::Other,
    ];

    pub fn of(code: u16) -> Self {
        match code {
            100..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusClass::Informational => "1xx",
            StatusClass::Success => "2xx",
            StatusClass::Redirection => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
            StatusClass::Other => "other",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Registry name of this class's counter.
    pub fn metric_name(self, prefix: &str) -> String {
        format!("{prefix}.{}-responses", self.label())
    }
}

/// Counts responses by status class, then forwards to the wrapped sink.
pub struct StatusCodeMetrics<L> {
    inner: L,
    registry: Arc<MetricsRegistry>,
    prefix: String,
    classes: [OnceLock<Arc<Counter>>; CLASS_COUNT],
    exact: Option<DashMap<u16, Arc<Counter>>>,
}

impl<L: RequestLog> StatusCodeMetrics<L> {
    pub fn new(inner: L, registry: Arc<MetricsRegistry>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            registry,
            prefix: prefix.into(),
            classes: std::array::from_fn(|_| OnceLock::new()),
            exact: None,
        }
    }

    /// Also keep one counter per exact code (`{prefix}.responses.{code}`).
    pub fn with_exact_codes(mut self) -> Self {
        self.exact = Some(DashMap::new());
        self
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn record(&self, status: u16) {
        let class = StatusClass::of(status);
        if let Some(c) = self.class_counter(class) {
            c.inc();
        }
        if let Some(exact) = &self.exact {
            if let Some(c) = exact.get(&status) {
                c.inc();
                return;
            }
            let name = format!("{}.responses.{status}", self.prefix);
            match self.registry.counter(&name) {
                Ok(c) => {
                    c.inc();
                    exact.insert(status, c);
                }
                Err(e) => tracing::warn!(error = %e, %name, "status code counter unavailable"),
            }
        }
    }

    fn class_counter(&self, class: StatusClass) -> Option<Arc<Counter>> {
        let cell = &self.classes[class.index()];
        if let Some(c) = cell.get() {
            return Some(Arc::clone(c));
        }
        let name = class.metric_name(&self.prefix);
        match self.registry.counter(&name) {
            // Racing initializers resolve to the same registry counter.
            Ok(c) => Some(Arc::clone(cell.get_or_init(|| c))),
            Err(e) => {
                tracing::warn!(error = %e, %name, "status class counter unavailable");
                None
            }
        }
    }
}

impl<L: RequestLog> RequestLog for StatusCodeMetrics<L> {
    fn log(&self, event: &CompletedRequest) {
        self.record(event.status);
        self.inner.log(event);
    }
}

/// tower layer feeding finished http exchanges into a [`RequestLog`].
pub struct RequestLogLayer<L> {
    sink: Arc<L>,
}

impl<L> RequestLogLayer<L> {
    pub fn new(sink: L) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn from_shared(sink: Arc<L>) -> Self {
        Self { sink }
    }
}

impl<L> Clone for RequestLogLayer<L> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S, L> Layer<S> for RequestLogLayer<L> {
    type Service = RequestLogService<S, L>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            sink: Arc::clone(&self.sink),
        }
    }
}

pub struct RequestLogService<S, L> {
    inner: S,
    sink: Arc<L>,
}

impl<S: Clone, L> Clone for RequestLogService<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S, L, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLogService<S, L>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
    L: RequestLog,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let start = Instant::now();
        let sink = Arc::clone(&self.sink);
        let fut = self.inner.call(req);

        Box::pin(async move {
            let res = fut.await;
            // Errors carry no status; they pass through without an event.
            if let Ok(resp) = &res {
                sink.log(&CompletedRequest {
                    method,
                    path,
                    status: resp.status().as_u16(),
                    elapsed: start.elapsed(),
                    request_id,
                });
            }
            res
        })
    }
}
