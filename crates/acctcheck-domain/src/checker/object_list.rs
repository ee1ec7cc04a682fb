//! Object-list checker.

use std::collections::HashSet;
use std::sync::Arc;

use acctcheck_sources::ObjectStore;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{CheckContext, SourceChecker};
use crate::aggregator::CategorySink;
use crate::model::{Category, CheckOutcome};

/// Object key holding the OS account list.
pub const DEFAULT_OBJECT_KEY: &str = "userlist";

/// Parses a flat identity list: one identity per line, surrounding whitespace
/// trimmed, blank lines and `#` comments skipped.
pub fn parse_identity_list(contents: &[u8]) -> HashSet<String> {
    String::from_utf8_lossy(contents)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Checks candidates against a flat list of known identities held in object
/// storage.
///
/// Performs exactly one fetch per run; every candidate is then answered from
/// memory. A failed fetch fails every candidate with the fetch error.
pub struct ObjectListChecker<F: ObjectStore + ?Sized> {
    store: Arc<F>,
    key: String,
}

impl<F: ObjectStore + ?Sized> ObjectListChecker<F> {
    /// Creates a checker reading the list stored under `key`.
    pub fn new(store: Arc<F>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl<F: ObjectStore + ?Sized> SourceChecker for ObjectListChecker<F> {
    fn category(&self) -> Category {
        Category::OsUsers
    }

    async fn check(&self, candidates: Arc<[String]>, sink: CategorySink, ctx: CheckContext) {
        let fetch = async {
            tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => None,
                result = self.store.fetch(&self.key) => Some(result),
            }
        };

        let known = match fetch.await {
            Some(Ok(contents)) => parse_identity_list(&contents),
            Some(Err(err)) => {
                warn!(
                    category = Category::OsUsers.as_str(),
                    key = %self.key,
                    error = %err,
                    kind = err.kind(),
                    "identity list fetch failed"
                );
                let reason = err.to_string();
                for candidate in candidates.iter() {
                    sink.record(candidate, CheckOutcome::failed(reason.as_str()));
                }
                return;
            }
            None => {
                for candidate in candidates.iter() {
                    sink.record(candidate, CheckOutcome::cancelled());
                }
                return;
            }
        };

        debug!(key = %self.key, known = known.len(), "identity list loaded");
        for candidate in candidates.iter() {
            let outcome = if known.contains(candidate.as_str()) {
                CheckOutcome::Found
            } else {
                CheckOutcome::NotFound
            };
            sink.record(candidate, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::test_support::run_checker;
    use crate::model::CANCELLED_REASON;
    use acctcheck_sources::{MemoryObjectStore, SourceError, NO_SUCH_KEY};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_parse_identity_list() {
        let known = parse_identity_list(b"# exported accounts\nT232323\r\n  Z121212  \n\nroot\n");
        assert_eq!(known.len(), 3);
        assert!(known.contains("T232323"));
        assert!(known.contains("Z121212"));
        assert!(known.contains("root"));
        assert!(!known.contains("# exported accounts"));
    }

    #[tokio::test]
    async fn test_single_fetch_answers_every_candidate() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put(DEFAULT_OBJECT_KEY, "T232323\nZ121212\n");
        let checker = ObjectListChecker::new(Arc::clone(&store), DEFAULT_OBJECT_KEY);

        let report = run_checker(
            &checker,
            &["T232323", "Z121212", "A000001", "T23"],
            CancellationToken::new(),
        )
        .await;

        // Containment is by whole line, so a prefix of a known identity is absent.
        assert_eq!(report.absent, ["A000001", "T23"]);
        assert!(!report.failed);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_all_candidates() {
        let store = Arc::new(MemoryObjectStore::new());
        let checker = ObjectListChecker::new(Arc::clone(&store), DEFAULT_OBJECT_KEY);

        let report = run_checker(&checker, &["u1", "u2"], CancellationToken::new()).await;

        assert!(report.absent.is_empty());
        assert!(report.failed);
        assert_eq!(report.failed_candidates, 2);
        let reason = report.failure_reason.unwrap();
        assert!(reason.starts_with("fetch error"));
        assert!(reason.contains(NO_SUCH_KEY));
    }

    #[tokio::test]
    async fn test_access_denied_fails_all_candidates() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put(DEFAULT_OBJECT_KEY, "u1\n");
        store.fail_key(
            DEFAULT_OBJECT_KEY,
            SourceError::FetchError {
                key: DEFAULT_OBJECT_KEY.to_string(),
                code: "AccessDenied".to_string(),
                message: "Access Denied".to_string(),
            },
        );
        let checker = ObjectListChecker::new(store, DEFAULT_OBJECT_KEY);

        let report = run_checker(&checker, &["u1", "u2"], CancellationToken::new()).await;

        assert!(report.absent.is_empty());
        assert_eq!(report.failed_candidates, 2);
        assert!(report.failure_reason.unwrap().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put(DEFAULT_OBJECT_KEY, "u1\n");
        let checker = ObjectListChecker::new(store, DEFAULT_OBJECT_KEY);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_checker(&checker, &["u1"], cancel).await;

        assert_eq!(report.failure_reason.as_deref(), Some(CANCELLED_REASON));
        assert!(report.absent.is_empty());
    }
}
