//! Cloud identity checker.

use std::sync::Arc;

use acctcheck_sources::{IdentityProvider, Lookup};
use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

use super::{CheckContext, SourceChecker};
use crate::aggregator::CategorySink;
use crate::limiter::{ConcurrencyLimiter, LimiterError};
use crate::model::{Category, CheckOutcome};

/// Checks candidates against the cloud identity provider.
///
/// Fans out one lookup per candidate on its own [`JoinSet`]. Every lookup holds
/// a [`ConcurrencyLimiter`] permit for its whole duration, so at most
/// `limiter.capacity()` lookups are outstanding at once across all requests
/// sharing this checker.
pub struct CloudIdentityChecker<P: IdentityProvider + ?Sized> {
    provider: Arc<P>,
    limiter: ConcurrencyLimiter,
}

impl<P: IdentityProvider + ?Sized> CloudIdentityChecker<P> {
    /// Creates a checker over `provider`, admission-controlled by `limiter`.
    pub fn new(provider: Arc<P>, limiter: ConcurrencyLimiter) -> Self {
        Self { provider, limiter }
    }

    /// Limiter guarding this checker's lookups.
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }
}

async fn lookup_one<P: IdentityProvider + ?Sized>(
    provider: &P,
    limiter: &ConcurrencyLimiter,
    candidate: &str,
    ctx: &CheckContext,
) -> CheckOutcome {
    if ctx.is_cancelled() {
        return CheckOutcome::cancelled();
    }

    let _permit = match limiter.acquire(ctx.cancel_token()).await {
        Ok(permit) => permit,
        Err(LimiterError::Cancelled) => return CheckOutcome::cancelled(),
        Err(err @ LimiterError::Closed) => return CheckOutcome::failed(err.to_string()),
    };

    ctx.run_or_cancel(async {
        match provider.lookup(candidate).await {
            Ok(Lookup::Found) => CheckOutcome::Found,
            Ok(Lookup::NotFound) => CheckOutcome::NotFound,
            Err(err) => {
                warn!(
                    category = Category::IamUsers.as_str(),
                    candidate,
                    error = %err,
                    kind = err.kind(),
                    "identity lookup failed"
                );
                CheckOutcome::failed(err.to_string())
            }
        }
    })
    .await
}

#[async_trait]
impl<P: IdentityProvider + ?Sized> SourceChecker for CloudIdentityChecker<P> {
    fn category(&self) -> Category {
        Category::IamUsers
    }

    async fn check(&self, candidates: Arc<[String]>, sink: CategorySink, ctx: CheckContext) {
        let mut lookups = JoinSet::new();

        for candidate in candidates.iter() {
            let candidate = candidate.clone();
            let provider = Arc::clone(&self.provider);
            let limiter = self.limiter.clone();
            let sink = sink.clone();
            let ctx = ctx.clone();
            let span = ctx.trace().candidate(Category::IamUsers, &candidate);

            lookups.spawn(
                async move {
                    let outcome = lookup_one(provider.as_ref(), &limiter, &candidate, &ctx).await;
                    sink.record(&candidate, outcome);
                }
                .instrument(span),
            );
        }

        // Join every lookup before returning so the category task completes
        // only after all of its sub-tasks have.
        while let Some(result) = lookups.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "identity lookup task did not complete");
                sink.fail_category(format!("identity lookup task failed: {err}"));
            }
        }
        debug!(candidates = candidates.len(), "identity lookups joined");
    }
}
