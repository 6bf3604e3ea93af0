//! Application routes served through the instrumented pipeline.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use httpmon_core::error::{ErrorCode, HttpmonError};

use crate::app_state::AppState;
use crate::context::{self, REQUEST_ID_HEADER};

/// Echo the body back from a pool worker, tagged with the request id.
pub async fn echo(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let submitted = state
        .pool()
        .submit_async(move || {
            if let Some(id) = request_id {
                context::set(id);
            }
            tracing::debug!(request_id = ?context::current(), bytes = body.len(), "echo");
            (context::current(), body)
        })
        .await;

    let outcome = match submitted {
        Ok(handle) => handle.wait().await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok((Some(id), body)) => (StatusCode::OK, [(REQUEST_ID_HEADER, id)], body).into_response(),
        Ok((None, body)) => (StatusCode::OK, body).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Respond with the requested status code and an empty body.
pub async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(s) => s.into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid status code").into_response(),
    }
}

fn error_response(e: &HttpmonError) -> Response {
    let status = match e.code() {
        ErrorCode::Saturation | ErrorCode::PoolShutdown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(error = %e, "request failed");
    (status, e.code().as_str()).into_response()
}
