//! Shared error type across httpmon crates.

use thiserror::Error;

/// Stable error codes (used in HTTP responses and logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A metric with the same name is already registered.
    DuplicateMetricName,
    /// A metric name is held by a metric of another kind.
    MetricKindMismatch,
    /// The worker pool queue is full.
    Saturation,
    /// The worker pool no longer admits jobs.
    PoolShutdown,
    /// A job body panicked.
    JobPanicked,
    /// The per-thread correlation context could not be cleared.
    ContextCleanup,
    /// Invalid configuration.
    BadConfig,
    /// Unsupported configuration version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in responses and structured logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::DuplicateMetricName => "DUPLICATE_METRIC_NAME",
            ErrorCode::MetricKindMismatch => "METRIC_KIND_MISMATCH",
            ErrorCode::Saturation => "SATURATION",
            ErrorCode::PoolShutdown => "POOL_SHUTDOWN",
            ErrorCode::JobPanicked => "JOB_PANICKED",
            ErrorCode::ContextCleanup => "CONTEXT_CLEANUP",
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, HttpmonError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum HttpmonError {
    #[error("duplicate metric name: {0}")]
    DuplicateMetricName(String),
    #[error("metric {name} is not a {expected}")]
    MetricKindMismatch { name: String, expected: &'static str },
    #[error("worker pool saturated (queue capacity {capacity})")]
    Saturation { capacity: usize },
    #[error("worker pool is shut down")]
    PoolShutdown,
    #[error("job panicked: {0}")]
    JobPanicked(String),
    #[error("context cleanup failed: {0}")]
    ContextCleanup(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl HttpmonError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            HttpmonError::DuplicateMetricName(_) => ErrorCode::DuplicateMetricName,
            HttpmonError::MetricKindMismatch { .. } => ErrorCode::MetricKindMismatch,
            HttpmonError::Saturation { .. } => ErrorCode::Saturation,
            HttpmonError::PoolShutdown => ErrorCode::PoolShutdown,
            HttpmonError::JobPanicked(_) => ErrorCode::JobPanicked,
            HttpmonError::ContextCleanup(_) => ErrorCode::ContextCleanup,
            HttpmonError::BadConfig(_) => ErrorCode::BadConfig,
            HttpmonError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            HttpmonError::Internal(_) => ErrorCode::Internal,
        }
    }
}
