//! Shared application state for the httpmon server.
//!
//! Startup order matters: the registry exists first, runtime gauges are
//! registered exactly once, then the pool and the pipeline metrics. Any
//! duplicate registration aborts startup with `DuplicateMetricName`.

use std::sync::Arc;

use httpmon_core::error::Result;
use httpmon_core::MetricsRegistry;

use crate::config::HttpmonConfig;
use crate::instrument::{InstrumentedLayer, StatusCodeMetrics, TracingRequestLog};
use crate::pool::{InstrumentedPool, PoolConfig};
use crate::runtime::RuntimeMetrics;

/// Request log used by the server: status counting in front of the access log.
pub type ServerRequestLog = StatusCodeMetrics<TracingRequestLog>;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: HttpmonConfig,
    registry: Arc<MetricsRegistry>,
    pool: InstrumentedPool,
    handler_layer: InstrumentedLayer,
    request_log: Arc<ServerRequestLog>,
}

impl AppState {
    /// Build application state with a fresh registry.
    pub fn new(cfg: HttpmonConfig) -> Result<Self> {
        Self::with_registry(cfg, Arc::new(MetricsRegistry::new()))
    }

    /// Build application state on top of an existing registry.
    pub fn with_registry(cfg: HttpmonConfig, registry: Arc<MetricsRegistry>) -> Result<Self> {
        let prefix = cfg.metrics.prefix.clone();

        if cfg.metrics.runtime_gauges {
            RuntimeMetrics::register(&registry)?;
        }

        let pool = InstrumentedPool::new(PoolConfig::from_server(&cfg.server, &prefix), &registry)?;
        let handler_layer = InstrumentedLayer::new(&registry, &prefix)?;

        let mut request_log = StatusCodeMetrics::new(TracingRequestLog, Arc::clone(&registry), &prefix);
        if cfg.metrics.exact_status_codes {
            request_log = request_log.with_exact_codes();
        }

        tracing::info!(%prefix, metrics = registry.len(), "instrumentation ready");

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry,
                pool,
                handler_layer,
                request_log: Arc::new(request_log),
            }),
        })
    }

    pub fn cfg(&self) -> &HttpmonConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn pool(&self) -> &InstrumentedPool {
        &self.inner.pool
    }

    pub fn handler_layer(&self) -> InstrumentedLayer {
        self.inner.handler_layer.clone()
    }

    pub fn request_log(&self) -> Arc<ServerRequestLog> {
        Arc::clone(&self.inner.request_log)
    }
}
