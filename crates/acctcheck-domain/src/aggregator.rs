//! Request-scoped result aggregation.
//!
//! A [`ResultAggregator`] is allocated per request with one bucket per requested
//! category. Workers write through [`CategorySink`] handles; each bucket has its
//! own lock so categories never contend with each other. The only read is
//! [`ResultAggregator::into_report`], which consumes the aggregator after every
//! worker holding a sink has been joined.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{DomainError, DomainResult};
use crate::model::{Category, CategoryReport, CheckOutcome, CheckReport};

#[derive(Debug, Default)]
struct Bucket {
    absent: Vec<String>,
    failed: bool,
    failure_reason: Option<String>,
    failed_candidates: usize,
}

impl Bucket {
    fn record(&mut self, candidate: &str, outcome: &CheckOutcome) {
        match outcome {
            CheckOutcome::Found => {}
            CheckOutcome::NotFound => self.absent.push(candidate.to_string()),
            CheckOutcome::CheckFailed(reason) => {
                self.failed_candidates += 1;
                self.mark_failed(reason);
            }
        }
    }

    fn mark_failed(&mut self, reason: &str) {
        self.failed = true;
        if self.failure_reason.is_none() {
            self.failure_reason = Some(reason.to_string());
        }
    }

    fn into_report(self) -> CategoryReport {
        CategoryReport {
            absent: self.absent,
            failed: self.failed,
            failure_reason: self.failure_reason,
            failed_candidates: self.failed_candidates,
        }
    }
}

type SharedBucket = Arc<Mutex<Bucket>>;

fn lock(bucket: &Mutex<Bucket>) -> std::sync::MutexGuard<'_, Bucket> {
    // A panicking writer cannot leave a bucket half-appended, so the data is
    // still consistent after poisoning.
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-request accumulator of check outcomes.
#[derive(Debug)]
pub struct ResultAggregator {
    buckets: HashMap<Category, SharedBucket>,
}

impl ResultAggregator {
    /// Allocates one empty bucket per category. The set of buckets is fixed
    /// from here on.
    pub fn new(categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            buckets: categories
                .into_iter()
                .map(|category| (category, SharedBucket::default()))
                .collect(),
        }
    }

    /// Appends one outcome to the bucket for `category`.
    pub fn append(
        &self,
        category: Category,
        candidate: &str,
        outcome: &CheckOutcome,
    ) -> DomainResult<()> {
        let bucket = self
            .buckets
            .get(&category)
            .ok_or_else(|| DomainError::CategoryNotAllocated {
                category: category.to_string(),
            })?;
        lock(bucket).record(candidate, outcome);
        Ok(())
    }

    /// Returns the append handle for `category`.
    pub fn sink(&self, category: Category) -> Option<CategorySink> {
        self.buckets.get(&category).map(|bucket| CategorySink {
            category,
            bucket: Arc::clone(bucket),
        })
    }

    /// Marks `category` failed without attributing the failure to a candidate.
    pub fn fail_category(&self, category: Category, reason: &str) -> DomainResult<()> {
        let bucket = self
            .buckets
            .get(&category)
            .ok_or_else(|| DomainError::CategoryNotAllocated {
                category: category.to_string(),
            })?;
        lock(bucket).mark_failed(reason);
        Ok(())
    }

    /// Consumes the aggregator and returns the final report.
    ///
    /// Must be called only after every task holding a [`CategorySink`] has been
    /// joined. A sink that is still alive is drained anyway, so nothing is lost.
    pub fn into_report(self) -> CheckReport {
        let mut report = CheckReport::new();
        for (category, bucket) in self.buckets {
            let bucket = match Arc::try_unwrap(bucket) {
                Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
                Err(shared) => std::mem::take(&mut *lock(&shared)),
            };
            report.insert(category, bucket.into_report());
        }
        report
    }
}

/// Append handle to one category's bucket.
///
/// Cheap to clone; clones are handed to per-candidate sub-tasks.
#[derive(Debug, Clone)]
pub struct CategorySink {
    category: Category,
    bucket: SharedBucket,
}

impl CategorySink {
    /// Category this sink writes to.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Records the outcome for one candidate.
    pub fn record(&self, candidate: &str, outcome: CheckOutcome) {
        metrics::counter!(
            "acctcheck_candidate_outcomes_total",
            "category" => self.category.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);
        lock(&self.bucket).record(candidate, &outcome);
    }

    /// Marks the whole category failed. The first reason recorded wins.
    pub fn fail_category(&self, reason: impl AsRef<str>) {
        lock(&self.bucket).mark_failed(reason.as_ref());
    }
}
