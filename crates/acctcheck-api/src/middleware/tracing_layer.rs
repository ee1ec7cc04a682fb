//! Per-request `http_request` span.

use std::{
    future::Future,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    extract::ConnectInfo,
    http::{header, Request, Response},
};
use tower::{Layer, Service};
use tracing::{field::Empty, info_span, Instrument, Span};

use super::request_id::request_id_from_headers;

/// Layer that wraps every request in an `http_request` span.
///
/// The span records method, path, host, user agent, remote address and request
/// id up front; the status code (and `error = true` for status >= 400) once the
/// response is ready. Handler spans such as `check_request` nest under it.
#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

fn header_str<B>(request: &Request<B>, name: header::HeaderName) -> &str {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TracingService<S>
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
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let host = request
            .uri()
            .host()
            .unwrap_or_else(|| header_str(&request, header::HOST));

        let span = info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
            host = %host,
            user_agent = %header_str(&request, header::USER_AGENT),
            remote_addr = %remote_addr,
            request_id = %request_id_from_headers(request.headers()).unwrap_or_default(),
            http.status_code = Empty,
            error = Empty,
            otel.kind = "server"
        );

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let response = inner.call(request).await?;
                let status = response.status();

                let span = Span::current();
                span.record("http.status_code", status.as_u16());
                if status.is_client_error() || status.is_server_error() {
                    span.record("error", true);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}
