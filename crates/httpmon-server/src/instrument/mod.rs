//! Transparent instrumentation around the request pipeline.

pub mod handler;
pub mod status;

pub use handler::{InstrumentedFuture, InstrumentedLayer, InstrumentedService};
pub use status::{
    CompletedRequest, NoopRequestLog, RequestLog, RequestLogLayer, RequestLogService,
    StatusClass, StatusCodeMetrics, TracingRequestLog,
};
