//! acctcheck-sources: collaborator boundary for the account existence checks.
//!
//! Defines the traits each category's checker talks to, plus in-memory,
//! PostgreSQL and HTTP implementations.

pub mod error;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{HealthStatus, SourceError, SourceResult, NO_SUCH_ENTITY, NO_SUCH_KEY};
pub use http::{HttpIdentityProvider, HttpObjectStore};
pub use memory::{MemoryIdentityProvider, MemoryObjectStore, MemoryUserStore};
pub use postgres::{PostgresConfig, PostgresUserStore, DEFAULT_COLUMN, DEFAULT_TABLE};
pub use traits::{
    validate_candidate, validate_sql_identifier, IdentityProvider, Lookup, ObjectStore, UserStore,
    MAX_CANDIDATE_LENGTH,
};
