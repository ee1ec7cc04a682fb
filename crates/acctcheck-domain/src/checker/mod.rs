//! Source checkers.
//!
//! A checker answers "does candidate X exist in source Y" for one category.
//! Every checker satisfies the same contract, so the coordinator and the
//! aggregator never need to know which variant they are driving.
//!
//! # Contract
//!
//! - Every candidate handed to [`SourceChecker::check`] gets exactly one outcome
//!   recorded through the sink, unless the whole category is failed via
//!   [`CategorySink::fail_category`].
//! - Source errors become [`CheckOutcome::CheckFailed`]; they are never recorded
//!   as `NotFound`.
//! - Work not started before cancellation is recorded as
//!   [`CheckOutcome::cancelled`], and in-flight calls are abandoned.
//! - Any sub-tasks are joined before `check` returns.

mod database;
mod directory;
mod identity;
mod object_list;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::aggregator::CategorySink;
use crate::model::{Category, CheckOutcome};
use crate::trace::TraceContext;

pub use database::DatabaseChecker;
pub use directory::{DirectoryChecker, DirectoryStubMode};
pub use identity::CloudIdentityChecker;
pub use object_list::{parse_identity_list, ObjectListChecker, DEFAULT_OBJECT_KEY};

/// Uniform contract implemented by every category checker.
#[async_trait]
pub trait SourceChecker: Send + Sync + 'static {
    /// Category this checker answers for.
    fn category(&self) -> Category;

    /// Checks every candidate and records the outcomes through `sink`.
    async fn check(&self, candidates: Arc<[String]>, sink: CategorySink, ctx: CheckContext);
}

/// Per-task context: cancellation plus trace correlation.
#[derive(Debug, Clone)]
pub struct CheckContext {
    cancel: CancellationToken,
    trace: TraceContext,
}

impl CheckContext {
    /// Creates a context.
    pub fn new(cancel: CancellationToken, trace: TraceContext) -> Self {
        Self { cancel, trace }
    }

    /// Cancellation token for the request.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Trace correlation for the current level.
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Runs `call` unless the request is cancelled first, in which case the
    /// call is dropped and a cancelled outcome is returned.
    pub(crate) async fn run_or_cancel<F>(&self, call: F) -> CheckOutcome
    where
        F: Future<Output = CheckOutcome>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => CheckOutcome::cancelled(),
            outcome = call => outcome,
        }
    }
}
