//! Middleware stack tests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceExt;

use super::*;

/// Echoes the request id the handler sees, so tests can compare it with the
/// response header.
async fn echo_request_id(headers: HeaderMap) -> String {
    request_id_from_headers(&headers)
        .unwrap_or_default()
        .to_string()
}

fn test_app(metrics: Arc<RequestMetrics>) -> Router {
    let router = Router::new()
        .route("/", get(echo_request_id))
        .route("/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/bad", get(|| async { StatusCode::BAD_REQUEST }));
    apply_middleware(router, metrics)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_request_id_is_generated_and_visible_to_handler() {
    let app = test_app(Arc::new(RequestMetrics::new()));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let header = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .expect("response carries a request id")
        .to_str()
        .unwrap()
        .to_string();
    assert!(uuid::Uuid::parse_str(&header).is_ok(), "generated id is a UUID");
    assert_eq!(body_string(response).await, header);
}

#[tokio::test]
async fn test_inbound_request_id_is_echoed() {
    let app = test_app(Arc::new(RequestMetrics::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(REQUEST_ID_HEADER, "caller-7f3a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(REQUEST_ID_HEADER).unwrap(),
        "caller-7f3a"
    );
    assert_eq!(body_string(response).await, "caller-7f3a");
}

#[tokio::test]
async fn test_invalid_inbound_request_id_is_replaced() {
    let app = test_app(Arc::new(RequestMetrics::new()));
    let oversized = "x".repeat(MAX_REQUEST_ID_LENGTH + 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(REQUEST_ID_HEADER, oversized.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let header = response.headers().get(REQUEST_ID_HEADER).unwrap();
    assert_ne!(header, oversized.as_str());
}

#[tokio::test]
async fn test_metrics_are_collected_per_status_class() {
    let metrics = Arc::new(RequestMetrics::new());
    let app = test_app(Arc::clone(&metrics));

    for uri in ["/", "/", "/bad", "/boom", "/missing"] {
        let _ = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
    }

    assert_eq!(metrics.request_count(), 5);
    assert_eq!(metrics.success_count(), 2);
    assert_eq!(metrics.client_error_count(), 2);
    assert_eq!(metrics.server_error_count(), 1);
}

#[tokio::test]
async fn test_error_responses_pass_through_unchanged() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let app = test_app(Arc::new(RequestMetrics::new()));

    let response = app
        .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}
