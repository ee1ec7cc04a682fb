//! Request-scoped trace correlation.
//!
//! Carries the request id and the current tracing span down both fan-out
//! levels. Purely observational: nothing here affects control flow.

use std::sync::Arc;

use tracing::{debug_span, info_span, Span};

use crate::model::Category;

/// Correlation context for one request.
#[derive(Debug, Clone)]
pub struct TraceContext {
    request_id: Arc<str>,
    span: Span,
}

impl TraceContext {
    /// Opens the root `check_request` span for a request.
    pub fn root(request_id: impl Into<Arc<str>>, categories: usize, candidates: usize) -> Self {
        let request_id = request_id.into();
        let span = info_span!(
            "check_request",
            request_id = %request_id,
            categories,
            candidates,
        );
        Self { request_id, span }
    }

    /// Opens a root span with a freshly generated request id.
    pub fn generate(categories: usize, candidates: usize) -> Self {
        Self::root(uuid::Uuid::new_v4().to_string(), categories, candidates)
    }

    /// Opens a `category_check` child span.
    pub fn category(&self, category: Category, candidates: usize) -> Self {
        let span = info_span!(
            parent: &self.span,
            "category_check",
            request_id = %self.request_id,
            category = category.as_str(),
            candidates,
        );
        Self {
            request_id: Arc::clone(&self.request_id),
            span,
        }
    }

    /// Opens a `candidate_check` child span.
    pub fn candidate(&self, category: Category, candidate: &str) -> Span {
        debug_span!(
            parent: &self.span,
            "candidate_check",
            request_id = %self.request_id,
            category = category.as_str(),
            candidate,
        )
    }

    /// Correlation id of the request.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Span for the current level.
    pub fn span(&self) -> &Span {
        &self.span
    }
}
