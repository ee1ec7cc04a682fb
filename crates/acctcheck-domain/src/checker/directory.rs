//! Directory service stand-in.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CheckContext, SourceChecker};
use crate::aggregator::CategorySink;
use crate::model::{Category, CheckOutcome};

/// Fixed behaviour of a [`DirectoryChecker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryStubMode {
    /// Every candidate exists; nothing is ever reported absent.
    #[default]
    AllFound,
    /// No candidate exists.
    AllNotFound,
    /// The directory cannot be reached; every candidate fails.
    Unavailable,
}

/// Checker for directory-backed categories (`AdUsers`, `LdapUsers`) with a
/// deterministic outcome.
#[derive(Debug, Clone)]
pub struct DirectoryChecker {
    category: Category,
    mode: DirectoryStubMode,
}

impl DirectoryChecker {
    /// Creates a stand-in answering for `category`.
    pub fn new(category: Category, mode: DirectoryStubMode) -> Self {
        Self { category, mode }
    }

    /// Configured mode.
    pub fn mode(&self) -> DirectoryStubMode {
        self.mode
    }
}

#[async_trait]
impl SourceChecker for DirectoryChecker {
    fn category(&self) -> Category {
        self.category
    }

    async fn check(&self, candidates: Arc<[String]>, sink: CategorySink, ctx: CheckContext) {
        for candidate in candidates.iter() {
            let outcome = if ctx.is_cancelled() {
                CheckOutcome::cancelled()
            } else {
                match self.mode {
                    DirectoryStubMode::AllFound => CheckOutcome::Found,
                    DirectoryStubMode::AllNotFound => CheckOutcome::NotFound,
                    DirectoryStubMode::Unavailable => CheckOutcome::failed(format!(
                        "directory service for {} is unavailable",
                        self.category
                    )),
                }
            };
            sink.record(candidate, outcome);
        }
    }
}
