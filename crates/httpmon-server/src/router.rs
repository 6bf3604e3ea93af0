//! Axum router wiring.
//!
//! Layer order (outermost first): pipeline instrumentation, request log with
//! status counting, routes.

use axum::{
    routing::{get, post},
    Router,
};

use crate::instrument::RequestLogLayer;
use crate::{app_state::AppState, handlers, ops};

pub fn build_router(state: AppState) -> Router {
    let request_log = RequestLogLayer::from_shared(state.request_log());
    let instrumented = state.handler_layer();

    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .route("/metrics.json", get(ops::metrics_json))
        .route("/v1/echo", post(handlers::echo))
        .route("/v1/status/:code", get(handlers::status))
        .layer(request_log)
        // Added last, so it wraps everything above.
        .layer(instrumented)
        .with_state(state)
}
