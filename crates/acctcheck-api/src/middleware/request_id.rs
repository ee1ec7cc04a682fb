//! Request id propagation.
//!
//! The inbound `x-request-id` is reused when it is a sane token; otherwise a
//! UUIDv4 is generated. The id is written back to the request headers (so
//! handlers and inner layers see it) and echoed on the response.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::{HeaderMap, HeaderValue, Request, Response};
use tower::{Layer, Service};
use uuid::Uuid;

/// HTTP header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound id that is reused as-is.
pub const MAX_REQUEST_ID_LENGTH: usize = 128;

/// Reads the correlation id from `headers`, if present and valid.
pub fn request_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| is_valid_request_id(id))
}

fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LENGTH
        && id.bytes().all(|b| b.is_ascii_graphic())
}

#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestIdService<S>
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

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let request_id = request_id_from_headers(request.headers())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Always valid: either checked above or a UUID.
        let header = HeaderValue::from_str(&request_id).ok();
        if let Some(value) = header.clone() {
            request.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(request).await?;
            if let Some(value) = header {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}
