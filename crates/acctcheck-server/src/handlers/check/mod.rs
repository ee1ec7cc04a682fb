//! Check coordination across source categories.
//!
//! One request fans out in two levels:
//!
//! 1. **Category tasks**: one task per non-empty category on the coordinator's
//!    join set.
//! 2. **Candidate tasks**: checkers that make one remote call per candidate
//!    fan out again on their own join set, bounded by a concurrency limiter.
//!
//! Each level joins its own tasks before completing, so when the coordinator's
//! join barrier opens nothing is still writing to the request's aggregator.

mod handler;
mod types;

pub use handler::{CheckCoordinator, CheckerRegistry};
pub use types::{
    CheckOptions, CheckResponse, CoordinatorError, CoordinatorResult, TaskRecord, TaskState,
};

#[cfg(test)]
mod tests;
