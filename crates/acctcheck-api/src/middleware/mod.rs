//! API middleware.
//!
//! Includes:
//! - Request id generation and echo
//! - Request metrics
//! - The `http_request` tracing span
//! - Request logging

mod logging;
mod metrics;
mod request_id;
mod tracing_layer;

use std::sync::Arc;

use axum::Router;

pub use logging::RequestLoggingLayer;
pub use metrics::{MetricsLayer, RequestMetrics};
pub use request_id::{
    request_id_from_headers, RequestIdLayer, MAX_REQUEST_ID_LENGTH, REQUEST_ID_HEADER,
};
pub use tracing_layer::TracingLayer;

/// Wraps `router` in the standard middleware stack.
///
/// The last `.layer()` call is the outermost, so requests pass through request
/// id, metrics, tracing and logging in that order. The request id therefore
/// exists before any other layer reads it.
pub fn apply_middleware(router: Router, metrics: Arc<RequestMetrics>) -> Router {
    router
        .layer(RequestLoggingLayer::new())
        .layer(TracingLayer::new())
        .layer(MetricsLayer::new(metrics))
        .layer(RequestIdLayer::new())
}

#[cfg(test)]
mod tests;
