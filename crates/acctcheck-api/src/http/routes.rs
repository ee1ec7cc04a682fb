//! HTTP route definitions and handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, warn};

use acctcheck_domain::{CheckReport, CheckRequest, DomainError};
use acctcheck_server::handlers::check::CoordinatorError;
use acctcheck_server::CheckOptions;

use super::state::AppState;
use crate::middleware::{apply_middleware, request_id_from_headers, RequestMetrics};
use crate::observability::{metrics_handler, MetricsState};

/// JSON extractor that rejects with 400 `validation_error` instead of axum's
/// 415/422, keeping 413 `payload_too_large` for oversized bodies.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    Err(ApiError::payload_too_large(message))
                } else {
                    Err(ApiError::validation_error(message))
                }
            }
        }
    }
}

/// Default request body size limit (1 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Default path of the Prometheus endpoint.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/check", get(check_defaults).post(check))
        .route("/ready", get(readiness_check))
}

/// Creates the router with the default body limit and no metrics endpoint.
pub fn create_router(state: AppState) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the router with a custom body size limit.
pub fn create_router_with_body_limit(state: AppState, body_limit: usize) -> Router {
    let router = api_routes()
        .route("/health", get(health_check))
        .with_state(Arc::new(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(map_response(payload_too_large_as_json));

    apply_middleware(router, Arc::new(RequestMetrics::new()))
}

/// Creates the router plus the Prometheus endpoint at [`DEFAULT_METRICS_PATH`].
pub fn create_router_with_observability(state: AppState, metrics_state: MetricsState) -> Router {
    create_router_with_observability_and_limit(
        state,
        metrics_state,
        DEFAULT_METRICS_PATH,
        DEFAULT_BODY_LIMIT,
    )
}

/// Creates the router plus the Prometheus endpoint at `metrics_path`.
///
/// The body limit applies to the API routes only.
pub fn create_router_with_observability_and_limit(
    state: AppState,
    metrics_state: MetricsState,
    metrics_path: &str,
    body_limit: usize,
) -> Router {
    let api_router = api_routes()
        .with_state(Arc::new(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(map_response(payload_too_large_as_json));

    let observability_router = Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(metrics_state);

    apply_middleware(
        api_router.merge(observability_router),
        Arc::new(RequestMetrics::new()),
    )
}

/// Rewrites the body limit layer's plain-text 413 into the JSON error body.
///
/// A declared `Content-Length` over the limit is rejected by the layer before
/// any extractor runs, so [`JsonBadRequest`] never sees it.
async fn payload_too_large_as_json(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ApiError::payload_too_large("request body exceeds the size limit").into_response();
    }
    response
}

// ============================================================
// Error Handling
// ============================================================

/// Error codes carried in the `code` field of error bodies.
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Error body: `{"code": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Request rejected before dispatch (400).
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    /// Body over the configured limit (413).
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(error_codes::PAYLOAD_TOO_LARGE, message)
    }

    /// Whole-request failure (500).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    fn status(&self) -> StatusCode {
        match self.code.as_str() {
            error_codes::VALIDATION_ERROR => StatusCode::BAD_REQUEST,
            error_codes::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        if err.is_input_error() {
            return ApiError::validation_error(err.to_string());
        }
        error!(error = %err, "check request hit an aggregation fault");
        ApiError::internal_error("check request could not be completed")
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        error!(error = %err, "check request could not be dispatched");
        ApiError::internal_error("check request could not be completed")
    }
}

// ============================================================
// Health and Readiness Checks
// ============================================================

/// Liveness probe; does not touch any collaborator.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: 200 when the database collaborator answers, 503 otherwise.
///
/// The failure cause is logged, not returned.
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.user_store.health_check().await {
        Ok(status) if status.healthy => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "checks": {
                    "database": "ok"
                }
            })),
        ),
        Ok(status) => {
            warn!(backend = status.backend, "readiness check failed: database unhealthy");
            not_ready()
        }
        Err(e) => {
            error!(error = %e, "readiness check failed: database unavailable");
            not_ready()
        }
    }
}

fn not_ready() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "status": "not_ready",
            "checks": {
                "database": "unavailable"
            }
        })),
    )
}

// ============================================================
// Account Checks
// ============================================================

/// `POST /check`: body is an object mapping category names to candidate lists.
async fn check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBadRequest(body): JsonBadRequest<serde_json::Value>,
) -> Result<Json<CheckReport>, ApiError> {
    let request = CheckRequest::from_json(&body)?;
    run_check(&state, request, &headers).await
}

/// `GET /check`: runs the configured default candidate lists.
async fn check_defaults(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CheckReport>, ApiError> {
    let request = CheckRequest::clone(&state.defaults);
    run_check(&state, request, &headers).await
}

async fn run_check(
    state: &AppState,
    request: CheckRequest,
    headers: &HeaderMap,
) -> Result<Json<CheckReport>, ApiError> {
    let mut options = CheckOptions::default();
    if let Some(request_id) = request_id_from_headers(headers) {
        options = options.with_request_id(request_id);
    }

    let response = state.coordinator.check_with(request, options).await?;
    Ok(Json(response.report.sorted()))
}
