//! HTTP metrics middleware.
//!
//! Emits `acctcheck_http_requests_total` and
//! `acctcheck_http_request_duration_seconds`, labelled by method, matched
//! route and status class. A [`RequestMetrics`] instance also keeps atomic
//! totals so tests can read counts back without a Prometheus recorder.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    extract::MatchedPath,
    http::{Request, Response},
};
use tower::{Layer, Service};

/// Label used when no route matched, so unknown paths share one series.
const UNMATCHED_PATH: &str = "unmatched";

#[derive(Debug, Default)]
pub struct RequestMetrics {
    request_count: AtomicU64,
    total_duration_us: AtomicU64,
    success_count: AtomicU64,
    client_error_count: AtomicU64,
    server_error_count: AtomicU64,
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished request.
    pub fn record(&self, method: &str, path: &str, status: u16, duration_us: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_us
            .fetch_add(duration_us, Ordering::Relaxed);

        let class = status_class(status);
        let counter = match class {
            "2xx" => Some(&self.success_count),
            "4xx" => Some(&self.client_error_count),
            "5xx" => Some(&self.server_error_count),
            _ => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status_class", class.to_string()),
        ];
        metrics::counter!("acctcheck_http_requests_total", &labels).increment(1);
        metrics::histogram!("acctcheck_http_request_duration_seconds", &labels)
            .record(duration_us as f64 / 1_000_000.0);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn client_error_count(&self) -> u64 {
        self.client_error_count.load(Ordering::Relaxed)
    }

    pub fn server_error_count(&self) -> u64 {
        self.server_error_count.load(Ordering::Relaxed)
    }

    pub fn total_duration_us(&self) -> u64 {
        self.total_duration_us.load(Ordering::Relaxed)
    }

    /// Mean request duration; prefer the histogram for percentiles.
    pub fn avg_duration_us(&self) -> u64 {
        let count = self.request_count();
        if count == 0 {
            0
        } else {
            self.total_duration_us() / count
        }
    }
}

/// Layer that records [`RequestMetrics`] for every request.
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let method = request.method().to_string();
        let path = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| UNMATCHED_PATH.to_string());
        let metrics = Arc::clone(&self.metrics);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(request).await?;
            metrics.record(
                &method,
                &path,
                response.status().as_u16(),
                start.elapsed().as_micros() as u64,
            );
            Ok(response)
        })
    }
}
