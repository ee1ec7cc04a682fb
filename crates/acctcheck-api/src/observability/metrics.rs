//! Prometheus metrics infrastructure.
//!
//! Metrics are recorded through the `metrics` facade across all crates and
//! exposed by `metrics-exporter-prometheus`.
//!
//! # Metrics Exposed
//!
//! - `acctcheck_http_requests_total` / `acctcheck_http_request_duration_seconds`
//! - `acctcheck_check_requests_total` / `acctcheck_check_duration_seconds`
//! - `acctcheck_category_checks_total{category,status}`
//! - `acctcheck_candidate_outcomes_total{category,outcome}`
//! - `acctcheck_source_query_duration_seconds{operation,backend,status}`
//! - `acctcheck_source_query_timeout_total{operation,backend}`
//! - `acctcheck_source_pool_connections{backend,state}`
//! - `acctcheck_limiter_in_flight{limiter}`

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared handle used to render the exposition.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

fn register_default_metrics() {
    metrics::describe_counter!(
        "acctcheck_http_requests_total",
        "Total number of HTTP requests"
    );
    metrics::describe_histogram!(
        "acctcheck_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "acctcheck_check_requests_total",
        "Total number of check requests by status (success, partial)"
    );
    metrics::describe_histogram!(
        "acctcheck_check_duration_seconds",
        "Check request duration in seconds, from dispatch to report"
    );
    metrics::describe_counter!(
        "acctcheck_category_checks_total",
        "Category checks by category and status"
    );
    metrics::describe_counter!(
        "acctcheck_candidate_outcomes_total",
        "Candidate outcomes by category and outcome (found, not_found, check_failed)"
    );

    metrics::describe_histogram!(
        "acctcheck_source_query_duration_seconds",
        "Source query duration in seconds by operation, backend, and status"
    );
    metrics::describe_counter!(
        "acctcheck_source_query_timeout_total",
        "Source queries that exceeded their timeout"
    );
    metrics::describe_gauge!(
        "acctcheck_source_pool_connections",
        "Database pool connections by backend and state (active, idle, max)"
    );

    metrics::describe_gauge!(
        "acctcheck_limiter_in_flight",
        "Permits currently held per concurrency limiter"
    );
}

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the metrics endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}
