//! Database account checker.

use std::sync::Arc;

use acctcheck_sources::UserStore;
use async_trait::async_trait;
use tracing::{warn, Instrument};

use super::{CheckContext, SourceChecker};
use crate::aggregator::CategorySink;
use crate::model::{Category, CheckOutcome};

/// Checks candidates against the relational account table.
///
/// Issues one existence query per candidate, one at a time. The query itself
/// holds no shared lock; only the append to the sink is synchronized.
pub struct DatabaseChecker<S: UserStore + ?Sized> {
    store: Arc<S>,
}

impl<S: UserStore + ?Sized> DatabaseChecker<S> {
    /// Creates a checker over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn check_one(&self, candidate: &str) -> CheckOutcome {
        match self.store.exists(candidate).await {
            Ok(true) => CheckOutcome::Found,
            Ok(false) => CheckOutcome::NotFound,
            Err(err) => {
                warn!(
                    category = Category::DbUsers.as_str(),
                    candidate,
                    error = %err,
                    kind = err.kind(),
                    "database existence check failed"
                );
                CheckOutcome::failed(err.to_string())
            }
        }
    }
}

#[async_trait]
impl<S: UserStore + ?Sized> SourceChecker for DatabaseChecker<S> {
    fn category(&self) -> Category {
        Category::DbUsers
    }

    async fn check(&self, candidates: Arc<[String]>, sink: CategorySink, ctx: CheckContext) {
        for candidate in candidates.iter() {
            if ctx.is_cancelled() {
                sink.record(candidate, CheckOutcome::cancelled());
                continue;
            }
            let span = ctx.trace().candidate(Category::DbUsers, candidate);
            let outcome = ctx
                .run_or_cancel(self.check_one(candidate))
                .instrument(span)
                .await;
            sink.record(candidate, outcome);
        }
    }
}
