//! Check coordinator implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use acctcheck_domain::{
    Category, CheckContext, CheckRequest, ResultAggregator, SourceChecker, TraceContext,
};
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::types::{
    CheckOptions, CheckResponse, CoordinatorError, CoordinatorResult, TaskRecord, TaskState,
};

/// Checkers keyed by the category they answer for.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: HashMap<Category, Arc<dyn SourceChecker>>,
}

impl CheckerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `checker` under its own category, replacing any previous one.
    pub fn register(&mut self, checker: Arc<dyn SourceChecker>) -> &mut Self {
        self.checkers.insert(checker.category(), checker);
        self
    }

    /// Builder-style [`CheckerRegistry::register`].
    pub fn with(mut self, checker: Arc<dyn SourceChecker>) -> Self {
        self.register(checker);
        self
    }

    /// Checker for `category`.
    pub fn get(&self, category: Category) -> Option<&Arc<dyn SourceChecker>> {
        self.checkers.get(&category)
    }

    /// Categories with a registered checker.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.checkers.keys().copied()
    }
}

impl std::fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut categories: Vec<_> = self.categories().collect();
        categories.sort();
        f.debug_struct("CheckerRegistry")
            .field("categories", &categories)
            .finish()
    }
}

/// Coordinates one check request across its categories.
///
/// For every category with candidates, one task is spawned on a [`JoinSet`].
/// The coordinator waits for all of them (the join barrier) before taking the
/// consuming snapshot of the request's [`ResultAggregator`]. State is never
/// shared between requests; only the checkers (and their limiters) are.
///
/// A per-request [`CancellationToken`] reaches every task. It is cancelled when
/// the request deadline elapses, when the caller's parent token fires, or when
/// this future is dropped.
#[derive(Debug, Clone)]
pub struct CheckCoordinator {
    registry: Arc<CheckerRegistry>,
    request_timeout: Option<Duration>,
}

impl CheckCoordinator {
    /// Creates a coordinator with no request deadline.
    pub fn new(registry: CheckerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            request_timeout: None,
        }
    }

    /// Sets the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The registered checkers.
    pub fn registry(&self) -> &CheckerRegistry {
        &self.registry
    }

    /// Runs a request with default options.
    pub async fn check(&self, request: CheckRequest) -> CoordinatorResult<CheckResponse> {
        self.check_with(request, CheckOptions::default()).await
    }

    /// Runs a request.
    pub async fn check_with(
        &self,
        request: CheckRequest,
        options: CheckOptions,
    ) -> CoordinatorResult<CheckResponse> {
        let categories = request.categories().count();
        let trace = match options.request_id {
            Some(id) => TraceContext::root(id, categories, request.candidate_count()),
            None => TraceContext::generate(categories, request.candidate_count()),
        };
        let span = trace.span().clone();
        let cancel = options
            .parent_cancel
            .map(|parent| parent.child_token())
            .unwrap_or_default();

        self.run(request, trace, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: CheckRequest,
        trace: TraceContext,
        cancel: CancellationToken,
    ) -> CoordinatorResult<CheckResponse> {
        let started = std::time::Instant::now();
        // Dropping this future (caller went away) cancels every task.
        let guard = cancel.clone().drop_guard();

        let aggregator = ResultAggregator::new(request.categories());
        let mut tasks: JoinSet<Category> = JoinSet::new();
        let mut task_ids: HashMap<Id, Category> = HashMap::new();
        let mut records: BTreeMap<Category, TaskRecord> = BTreeMap::new();

        for (category, candidates) in request.dispatchable() {
            let Some(checker) = self.registry.get(category) else {
                let reason = format!("no checker configured for {category}");
                warn!(category = category.as_str(), "{reason}");
                aggregator
                    .fail_category(category, &reason)
                    .map_err(|e| dispatch_error(e.to_string()))?;
                continue;
            };
            let sink = aggregator
                .sink(category)
                .ok_or_else(|| dispatch_error(format!("no result bucket for {category}")))?;

            let mut record = TaskRecord::new(category, candidates.len());
            let ctx = CheckContext::new(cancel.clone(), trace.category(category, candidates.len()));
            let span = ctx.trace().span().clone();
            let checker = Arc::clone(checker);
            let candidates = Arc::clone(candidates);

            let handle = tasks.spawn(
                async move {
                    checker.check(candidates, sink, ctx).await;
                    category
                }
                .instrument(span),
            );
            task_ids.insert(handle.id(), category);
            record.advance(TaskState::Running);
            records.insert(category, record);
        }

        let dispatched = records.len();
        debug!(dispatched, "category tasks dispatched");

        let mut aborted = 0usize;
        let deadline = self.request_timeout.map(|timeout| Instant::now() + timeout);

        // Join barrier: every task, and everything it spawned, completes here.
        loop {
            let joined = match deadline {
                Some(deadline) if !cancel.is_cancelled() => {
                    tokio::select! {
                        joined = tasks.join_next_with_id() => joined,
                        _ = tokio::time::sleep_until(deadline) => {
                            warn!(
                                request_id = trace.request_id(),
                                "request deadline elapsed, cancelling unfinished checks"
                            );
                            cancel.cancel();
                            continue;
                        }
                    }
                }
                _ => tasks.join_next_with_id().await,
            };

            let Some(joined) = joined else { break };
            match joined {
                Ok((_, category)) => {
                    debug!(category = category.as_str(), "category task joined");
                }
                Err(err) => {
                    let Some(category) = task_ids.get(&err.id()).copied() else {
                        error!(error = %err, "unknown category task failed");
                        continue;
                    };
                    if err.is_cancelled() {
                        aborted += 1;
                    }
                    error!(category = category.as_str(), error = %err, "category task did not complete");
                    aggregator
                        .fail_category(category, &format!("category task failed: {err}"))
                        .map_err(|e| dispatch_error(e.to_string()))?;
                    if let Some(record) = records.get_mut(&category) {
                        record.advance(TaskState::Failed);
                    }
                }
            }
        }

        if dispatched > 0 && aborted == dispatched {
            return Err(dispatch_error(
                "every category task was aborted before completing",
            ));
        }

        drop(guard);
        // The join set is empty, so every sink has been dropped with its task.
        let report = aggregator.into_report();

        for (category, result) in report.iter() {
            let status = if result.failed { "failed" } else { "success" };
            metrics::counter!(
                "acctcheck_category_checks_total",
                "category" => category.as_str(),
                "status" => status
            )
            .increment(1);

            if result.failed {
                warn!(
                    category = category.as_str(),
                    absent = result.absent.len(),
                    failed_candidates = result.failed_candidates,
                    failure_reason = result.failure_reason.as_deref().unwrap_or(""),
                    "category check finished with failures"
                );
            } else {
                info!(
                    category = category.as_str(),
                    absent = result.absent.len(),
                    "category check finished"
                );
            }

            if let Some(record) = records.get_mut(&category) {
                if record.state == TaskState::Running {
                    record.advance(if result.failed {
                        TaskState::Failed
                    } else {
                        TaskState::Completed
                    });
                }
                record.advance(TaskState::Reported);
            }
        }

        let status = if report.has_failures() { "partial" } else { "success" };
        metrics::counter!("acctcheck_check_requests_total", "status" => status).increment(1);
        metrics::histogram!("acctcheck_check_duration_seconds").record(started.elapsed().as_secs_f64());

        info!(
            categories = report.len(),
            dispatched,
            status,
            duration_ms = started.elapsed().as_millis() as u64,
            "check request completed"
        );

        Ok(CheckResponse {
            request_id: trace.request_id().to_string(),
            report,
            tasks: records.into_values().collect(),
        })
    }
}

fn dispatch_error(message: impl Into<String>) -> CoordinatorError {
    CoordinatorError::Dispatch {
        message: message.into(),
    }
}
