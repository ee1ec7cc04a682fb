//! acctcheck-server: request coordination and configuration
//!
//! This crate contains the business logic layer:
//! - Check coordinator fanning a request out across source categories
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              acctcheck-server               │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  handlers/   - Request handlers             │
//! │    check/         - Check coordinator       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod handlers;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::check::{CheckCoordinator, CheckOptions, CheckResponse, CheckerRegistry};
