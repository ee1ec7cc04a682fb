//! Source error types.

use std::time::Duration;

use thiserror::Error;

/// Error code reported by object stores when the requested key does not exist.
pub const NO_SUCH_KEY: &str = "NoSuchKey";

/// Error code identity providers use for "no such identity".
pub const NO_SUCH_ENTITY: &str = "NoSuchEntity";

/// Errors raised by the collaborators backing each category.
///
/// None of these mean "the identity does not exist". Absence is a successful
/// answer (`Ok(false)` / `Lookup::NotFound`); every variant here means the source
/// could not give an answer at all.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Could not connect to the backing source.
    #[error("connection error: {message}")]
    ConnectionError { message: String },

    /// The existence query itself failed.
    #[error("query error: {message}")]
    QueryError { message: String },

    /// The operation exceeded its deadline.
    #[error("operation '{operation}' timed out after {timeout:?}")]
    QueryTimeout { operation: String, timeout: Duration },

    /// The identity provider answered with an error other than "no such identity".
    ///
    /// The provider's code and message are kept verbatim for diagnostics.
    #[error("{code}: {message}")]
    Provider { code: String, message: String },

    /// Fetching an object from the object store failed.
    #[error("fetch error for '{key}': {code}: {message}")]
    FetchError {
        key: String,
        code: String,
        message: String,
    },

    /// Input rejected before reaching the source.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Internal error.
    #[error("internal source error: {message}")]
    InternalError { message: String },
}

impl SourceError {
    /// Short, stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::ConnectionError { .. } => "connection",
            SourceError::QueryError { .. } => "query",
            SourceError::QueryTimeout { .. } => "timeout",
            SourceError::Provider { .. } => "provider",
            SourceError::FetchError { .. } => "fetch",
            SourceError::InvalidInput { .. } => "invalid_input",
            SourceError::InternalError { .. } => "internal",
        }
    }
}

/// Health status reported by a source's health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the source answered the probe.
    pub healthy: bool,
    /// Probe latency.
    pub latency: Duration,
    /// Backend label (e.g. "postgres", "memory").
    pub backend: &'static str,
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
