//! acctcheck-domain: core account existence check logic
//!
//! This crate contains:
//! - The request/report model and its validation
//! - The per-request result aggregator
//! - The bounded concurrency limiter for per-candidate remote calls
//! - Trace correlation carried down both fan-out levels
//! - The source checker contract and its variants
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              acctcheck-domain               │
//! ├─────────────────────────────────────────────┤
//! │  model/      - Categories, requests, reports│
//! │  aggregator  - Per-category result buckets  │
//! │  limiter     - Semaphore admission control  │
//! │  trace       - Request correlation spans    │
//! │  checker/    - Database, identity, object   │
//! │                list and directory checkers  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod checker;
pub mod error;
pub mod limiter;
pub mod model;
pub mod trace;

// Re-export commonly used types at the crate root
pub use aggregator::{CategorySink, ResultAggregator};
pub use checker::{
    CheckContext, CloudIdentityChecker, DatabaseChecker, DirectoryChecker, DirectoryStubMode,
    ObjectListChecker, SourceChecker,
};
pub use error::{DomainError, DomainResult};
pub use limiter::{ConcurrencyLimiter, LimiterError, LimiterPermit, DEFAULT_MAX_CONCURRENCY};
pub use model::{Category, CategoryReport, CheckOutcome, CheckReport, CheckRequest};
pub use trace::TraceContext;
