//! Request pipeline instrumentation (tower middleware).
//!
//! `InstrumentedLayer` wraps a whole handler chain and records, under the
//! configured prefix:
//! - `{prefix}.active-requests`  gauge, +1 before the inner call, -1 on exit
//! - `{prefix}.request-duration` histogram of wall-clock time (µs)
//! - `{prefix}.requests`         meter, one mark per invocation
//!
//! The wrapped service keeps the inner `Response` and `Error` types and hands
//! both back untouched. Bookkeeping lives in a drop guard, so it also runs when
//! the inner call errors, panics, or the response future is dropped early.
//! Add this layer last so it is the outermost one and times every inner layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use pin_project_lite::pin_project;
use tower::{Layer, Service};

use httpmon_core::error::Result;
use httpmon_core::{Gauge, Histogram, Meter, MetricsRegistry};

struct HandlerMetrics {
    active: Arc<Gauge>,
    duration: Arc<Histogram>,
    requests: Arc<Meter>,
}

#[derive(Clone)]
pub struct InstrumentedLayer {
    metrics: Arc<HandlerMetrics>,
}

impl InstrumentedLayer {
    /// Register the pipeline metrics under `prefix`.
    pub fn new(registry: &MetricsRegistry, prefix: &str) -> Result<Self> {
        let metrics = HandlerMetrics {
            active: registry.register_gauge(format!("{prefix}.active-requests"))?,
            duration: registry.register_histogram(format!("{prefix}.request-duration"))?,
            requests: registry.register_meter(format!("{prefix}.requests"))?,
        };
        Ok(Self {
            metrics: Arc::new(metrics),
        })
    }
}

impl<S> Layer<S> for InstrumentedLayer {
    type Service = InstrumentedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentedService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Clone)]
pub struct InstrumentedService<S> {
    inner: S,
    metrics: Arc<HandlerMetrics>,
}

impl<S> InstrumentedService<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, Req> Service<Req> for InstrumentedService<S>
where
    S: Service<Req>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = InstrumentedFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // Guard first: the inner `call` may already do work (or panic).
        let guard = InFlight::enter(Arc::clone(&self.metrics));
        let inner = self.inner.call(req);
        InstrumentedFuture {
            inner,
            guard: Some(guard),
        }
    }
}

pin_project! {
    /// Response future of [`InstrumentedService`].
    pub struct InstrumentedFuture<F> {
        #[pin]
        inner: F,
        guard: Option<InFlight>,
    }
}

impl<F: Future> Future for InstrumentedFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let out = ready!(this.inner.poll(cx));
        this.guard.take();
        Poll::Ready(out)
    }
}

/// One in-flight request; recording happens on drop.
struct InFlight {
    metrics: Arc<HandlerMetrics>,
    start: Instant,
}

impl InFlight {
    fn enter(metrics: Arc<HandlerMetrics>) -> Self {
        metrics.active.inc();
        Self {
            metrics,
            start: Instant::now(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.metrics.active.dec();
        self.metrics.duration.observe(self.start.elapsed());
        self.metrics.requests.mark();
    }
}
