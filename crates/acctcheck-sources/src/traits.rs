//! Collaborator trait definitions.
//!
//! Each category's checker talks to exactly one of these. Implementations must be
//! thread-safe (Send + Sync); a single instance is shared by every request.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::{HealthStatus, SourceError, SourceResult};

/// Maximum length of a candidate identity accepted by the sources.
pub const MAX_CANDIDATE_LENGTH: usize = 256;

/// Answer from an identity provider lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The identity exists.
    Found,
    /// The provider reported "no such identity".
    NotFound,
}

/// Relational store holding database accounts.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Returns whether `candidate` has a row in the account table.
    ///
    /// `Ok(false)` means the query ran and matched zero rows. Connection and
    /// query failures must be returned as errors, never as `Ok(false)`.
    async fn exists(&self, candidate: &str) -> SourceResult<bool>;

    /// Probes the store for readiness.
    async fn health_check(&self) -> SourceResult<HealthStatus>;
}

/// Cloud identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Looks up a single identity by name.
    async fn lookup(&self, candidate: &str) -> SourceResult<Lookup>;
}

/// Object storage holding flat artifacts such as the OS account list.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetches the full contents of the object stored under `key`.
    async fn fetch(&self, key: &str) -> SourceResult<Vec<u8>>;
}

/// Validates a candidate identity before it is sent to a source.
pub fn validate_candidate(candidate: &str) -> SourceResult<()> {
    if candidate.trim().is_empty() {
        return Err(SourceError::InvalidInput {
            message: "candidate cannot be empty".to_string(),
        });
    }
    if candidate.len() > MAX_CANDIDATE_LENGTH {
        return Err(SourceError::InvalidInput {
            message: format!(
                "candidate exceeds maximum length of {MAX_CANDIDATE_LENGTH} bytes (actual: {})",
                candidate.len()
            ),
        });
    }
    Ok(())
}

/// Validates a SQL identifier (table or column name) that is interpolated into
/// a query string. Only `[A-Za-z_][A-Za-z0-9_]*` up to 63 bytes is accepted.
pub fn validate_sql_identifier(ident: &str) -> SourceResult<()> {
    let mut chars = ident.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_head || !valid_tail || ident.len() > 63 {
        return Err(SourceError::InvalidInput {
            message: format!("invalid SQL identifier: '{ident}'"),
        });
    }
    Ok(())
}

/// Builds a healthy status for a backend that answered its probe.
pub(crate) fn healthy(backend: &'static str, started: Instant) -> HealthStatus {
    HealthStatus {
        healthy: true,
        latency: started.elapsed(),
        backend,
    }
}
