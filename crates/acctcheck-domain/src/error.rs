//! Domain error types for check requests.

use thiserror::Error;

/// Errors raised while building or aggregating a check request.
///
/// Every variant except [`DomainError::CategoryNotAllocated`] is an input
/// error, reported to the caller before any checker runs. That one is an
/// aggregator invariant violation and is never the caller's fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The request named a category that does not exist.
    #[error("unknown category: {name}")]
    UnknownCategory { name: String },

    /// A category value was not a list of strings.
    #[error("candidates for '{category}' must be an array of strings")]
    InvalidCandidates { category: String },

    /// A single candidate was rejected.
    #[error("invalid candidate in '{category}' at index {index}: {message}")]
    InvalidCandidate {
        category: String,
        index: usize,
        message: String,
    },

    /// A category carried more candidates than allowed.
    #[error("category '{category}' has {count} candidates, maximum is {max}")]
    TooManyCandidates {
        category: String,
        count: usize,
        max: usize,
    },

    /// The request body was not a JSON object.
    #[error("malformed request: {message}")]
    MalformedRequest { message: String },

    /// An outcome was appended for a category with no allocated bucket.
    #[error("no result bucket allocated for category {category}")]
    CategoryNotAllocated { category: String },
}

impl DomainError {
    /// Whether the error describes a bad request rather than an internal fault.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, DomainError::CategoryNotAllocated { .. })
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
