//! Check outcomes and reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::category::Category;

/// Reason recorded for candidates that were not checked because the request
/// was cancelled.
pub const CANCELLED_REASON: &str = "cancelled";

/// Outcome of checking one candidate against one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The identity exists in the source.
    Found,
    /// The source confirmed the identity does not exist.
    NotFound,
    /// The check could not be completed. Never folded into `NotFound`.
    CheckFailed(String),
}

impl CheckOutcome {
    /// Creates a failed outcome.
    pub fn failed(reason: impl Into<String>) -> Self {
        CheckOutcome::CheckFailed(reason.into())
    }

    /// Failed outcome for work abandoned on cancellation.
    pub fn cancelled() -> Self {
        CheckOutcome::CheckFailed(CANCELLED_REASON.to_string())
    }

    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::Found => "found",
            CheckOutcome::NotFound => "not_found",
            CheckOutcome::CheckFailed(_) => "failed",
        }
    }
}

/// Per-category result.
///
/// When `failed` is set, `absent` may be partial: an empty list does not mean
/// every candidate exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    /// Candidates confirmed not to exist.
    pub absent: Vec<String>,
    /// Whether any check in the category could not be completed.
    pub failed: bool,
    /// First failure observed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Number of candidates whose check failed.
    #[serde(skip)]
    pub failed_candidates: usize,
}

/// Consolidated report for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckReport {
    categories: BTreeMap<Category, CategoryReport>,
}

impl CheckReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result for `category`.
    pub fn insert(&mut self, category: Category, report: CategoryReport) {
        self.categories.insert(category, report);
    }

    /// Result for `category`.
    pub fn get(&self, category: Category) -> Option<&CategoryReport> {
        self.categories.get(&category)
    }

    /// Mutable result for `category`.
    pub fn get_mut(&mut self, category: Category) -> Option<&mut CategoryReport> {
        self.categories.get_mut(&category)
    }

    /// Iterates categories in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryReport)> + '_ {
        self.categories.iter().map(|(c, r)| (*c, r))
    }

    /// Number of categories in the report.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Returns true when the report has no categories.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Returns true when any category failed.
    pub fn has_failures(&self) -> bool {
        self.categories.values().any(|r| r.failed)
    }

    /// Sorts every absent list. Completion order is not meaningful, so the
    /// HTTP layer sorts for stable output.
    pub fn sorted(mut self) -> Self {
        for report in self.categories.values_mut() {
            report.absent.sort();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_wire_shape() {
        let mut report = CheckReport::new();
        report.insert(
            Category::DbUsers,
            CategoryReport {
                absent: vec!["bob".to_string()],
                ..Default::default()
            },
        );
        report.insert(
            Category::OsUsers,
            CategoryReport {
                absent: vec![],
                failed: true,
                failure_reason: Some("fetch error".to_string()),
                failed_candidates: 2,
            },
        );

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "DbUsers": {"absent": ["bob"], "failed": false},
                "OsUsers": {"absent": [], "failed": true, "failure_reason": "fetch error"}
            })
        );
        assert!(report.has_failures());
    }

    #[test]
    fn test_sorted_orders_absent_lists() {
        let mut report = CheckReport::new();
        report.insert(
            Category::IamUsers,
            CategoryReport {
                absent: vec!["zed".to_string(), "amy".to_string()],
                ..Default::default()
            },
        );
        let report = report.sorted();
        assert_eq!(report.get(Category::IamUsers).unwrap().absent, ["amy", "zed"]);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(CheckOutcome::Found.label(), "found");
        assert_eq!(CheckOutcome::NotFound.label(), "not_found");
        assert_eq!(CheckOutcome::cancelled(), CheckOutcome::failed(CANCELLED_REASON));
    }
}
