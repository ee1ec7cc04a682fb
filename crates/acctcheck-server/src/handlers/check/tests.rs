//! Tests for the check coordinator.

use super::*;
use acctcheck_domain::model::CANCELLED_REASON;
use acctcheck_domain::{
    Category, CategorySink, CheckContext, CheckOutcome, CheckRequest, CloudIdentityChecker,
    ConcurrencyLimiter, DatabaseChecker, DirectoryChecker, DirectoryStubMode, ObjectListChecker,
    SourceChecker,
};
use acctcheck_sources::{
    MemoryIdentityProvider, MemoryObjectStore, MemoryUserStore, SourceError,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================
// Test Checkers
// ============================================================

/// Checker whose task panics.
struct PanickingChecker;

#[async_trait]
impl SourceChecker for PanickingChecker {
    fn category(&self) -> Category {
        Category::LdapUsers
    }

    async fn check(&self, _candidates: Arc<[String]>, _sink: CategorySink, _ctx: CheckContext) {
        panic!("directory client crashed");
    }
}

/// Checker that waits for cancellation and records that it saw it.
struct BlockingChecker {
    observed_cancel: Arc<AtomicBool>,
}

#[async_trait]
impl SourceChecker for BlockingChecker {
    fn category(&self) -> Category {
        Category::AdUsers
    }

    async fn check(&self, candidates: Arc<[String]>, sink: CategorySink, ctx: CheckContext) {
        ctx.cancel_token().cancelled().await;
        self.observed_cancel.store(true, Ordering::SeqCst);
        for candidate in candidates.iter() {
            sink.record(candidate, CheckOutcome::cancelled());
        }
    }
}

/// Checker that never looks at the cancellation token.
struct UncooperativeChecker {
    delay: Duration,
}

#[async_trait]
impl SourceChecker for UncooperativeChecker {
    fn category(&self) -> Category {
        Category::LdapUsers
    }

    async fn check(&self, candidates: Arc<[String]>, sink: CategorySink, _ctx: CheckContext) {
        tokio::time::sleep(self.delay).await;
        for candidate in candidates.iter() {
            sink.record(candidate, CheckOutcome::NotFound);
        }
    }
}

struct Fixture {
    users: Arc<MemoryUserStore>,
    identities: Arc<MemoryIdentityProvider>,
    objects: Arc<MemoryObjectStore>,
    limiter: ConcurrencyLimiter,
}

impl Fixture {
    fn new() -> Self {
        let objects = Arc::new(MemoryObjectStore::new());
        objects.put("userlist", "T232323\nZ121212\n");
        Self {
            users: Arc::new(MemoryUserStore::with_users(["alice", "dbuser1"])),
            identities: Arc::new(MemoryIdentityProvider::with_identities(["svc-x"])),
            objects,
            limiter: ConcurrencyLimiter::new("iam", 4),
        }
    }

    fn with_identities(mut self, identities: MemoryIdentityProvider) -> Self {
        self.identities = Arc::new(identities);
        self
    }

    fn registry(&self) -> CheckerRegistry {
        CheckerRegistry::new()
            .with(Arc::new(DatabaseChecker::new(Arc::clone(&self.users))))
            .with(Arc::new(CloudIdentityChecker::new(
                Arc::clone(&self.identities),
                self.limiter.clone(),
            )))
            .with(Arc::new(ObjectListChecker::new(
                Arc::clone(&self.objects),
                "userlist",
            )))
            .with(Arc::new(DirectoryChecker::new(
                Category::AdUsers,
                DirectoryStubMode::AllFound,
            )))
    }

    fn coordinator(&self) -> CheckCoordinator {
        CheckCoordinator::new(self.registry())
    }
}

fn request(entries: Vec<(Category, Vec<&str>)>) -> CheckRequest {
    CheckRequest::new(entries).unwrap()
}

fn absent(response: &CheckResponse, category: Category) -> Vec<String> {
    let mut absent = response.report.get(category).unwrap().absent.clone();
    absent.sort();
    absent
}

// ============================================================
// Section 1: Report shape
// ============================================================

#[tokio::test]
async fn test_db_and_identity_categories() {
    let fixture = Fixture::new();
    let coordinator = fixture.coordinator();

    let response = coordinator
        .check(request(vec![
            (Category::DbUsers, vec!["alice", "bob"]),
            (Category::IamUsers, vec!["svc-x"]),
        ]))
        .await
        .unwrap();

    let db = response.report.get(Category::DbUsers).unwrap();
    assert_eq!(db.absent, ["bob"]);
    assert!(!db.failed);
    let iam = response.report.get(Category::IamUsers).unwrap();
    assert!(iam.absent.is_empty());
    assert!(!iam.failed);
    assert_eq!(response.report.len(), 2);
}

#[tokio::test]
async fn test_object_fetch_failure_isolated_from_siblings() {
    let fixture = Fixture::new();
    fixture.objects.fail_key(
        "userlist",
        SourceError::FetchError {
            key: "userlist".to_string(),
            code: "AccessDenied".to_string(),
            message: "Access Denied".to_string(),
        },
    );
    let coordinator = fixture.coordinator();

    let response = coordinator
        .check(request(vec![
            (Category::OsUsers, vec!["u1", "u2"]),
            (Category::DbUsers, vec!["alice", "carol"]),
        ]))
        .await
        .unwrap();

    let os = response.report.get(Category::OsUsers).unwrap();
    assert!(os.absent.is_empty());
    assert!(os.failed);
    assert!(os.failure_reason.as_deref().unwrap().starts_with("fetch error"));

    let db = response.report.get(Category::DbUsers).unwrap();
    assert_eq!(db.absent, ["carol"]);
    assert!(!db.failed);
}

#[tokio::test]
async fn test_empty_category_not_dispatched_but_reported() {
    let fixture = Fixture::new();
    let coordinator = fixture.coordinator();

    let response = coordinator
        .check(request(vec![
            (Category::IamUsers, vec![]),
            (Category::DbUsers, vec!["bob"]),
        ]))
        .await
        .unwrap();

    assert_eq!(response.tasks.len(), 1);
    assert_eq!(response.tasks[0].category, Category::DbUsers);
    assert_eq!(fixture.identities.lookup_count(), 0);

    let iam = response.report.get(Category::IamUsers).unwrap();
    assert!(iam.absent.is_empty());
    assert!(!iam.failed);
    assert!(iam.failure_reason.is_none());
    assert!(response.report.get(Category::OsUsers).is_none());
}

#[tokio::test]
async fn test_empty_request_returns_empty_report() {
    let coordinator = Fixture::new().coordinator();
    let response = coordinator.check(CheckRequest::default()).await.unwrap();
    assert!(response.report.is_empty());
    assert!(response.tasks.is_empty());
}

#[tokio::test]
async fn test_unregistered_category_fails_without_dispatch() {
    let fixture = Fixture::new();
    let coordinator = fixture.coordinator();

    let response = coordinator
        .check(request(vec![
            (Category::LdapUsers, vec!["cn=ops"]),
            (Category::DbUsers, vec!["bob"]),
        ]))
        .await
        .unwrap();

    let ldap = response.report.get(Category::LdapUsers).unwrap();
    assert!(ldap.failed);
    assert_eq!(
        ldap.failure_reason.as_deref(),
        Some("no checker configured for LdapUsers")
    );
    assert_eq!(absent(&response, Category::DbUsers), ["bob"]);
    assert!(response.tasks.iter().all(|t| t.category != Category::LdapUsers));
}

// ============================================================
// Section 2: Task lifecycle
// ============================================================

#[tokio::test]
async fn test_every_task_reported_after_barrier() {
    let fixture = Fixture::new();
    fixture.users.fail_candidate(
        "carol",
        SourceError::QueryError {
            message: "syntax error".to_string(),
        },
    );
    let coordinator = fixture.coordinator();

    let response = coordinator
        .check(request(vec![
            (Category::DbUsers, vec!["alice", "carol"]),
            (Category::IamUsers, vec!["svc-x", "svc-y"]),
            (Category::OsUsers, vec!["T232323"]),
            (Category::AdUsers, vec!["jdoe"]),
        ]))
        .await
        .unwrap();

    assert_eq!(response.tasks.len(), 4);
    assert!(response.tasks.iter().all(|t| t.state == TaskState::Reported));

    let db = response
        .tasks
        .iter()
        .find(|t| t.category == Category::DbUsers)
        .unwrap();
    assert_eq!(db.terminal, Some(TaskState::Failed));
    assert_eq!(db.candidates, 2);

    let iam = response
        .tasks
        .iter()
        .find(|t| t.category == Category::IamUsers)
        .unwrap();
    assert_eq!(iam.terminal, Some(TaskState::Completed));
}

#[test]
fn test_task_state_transitions() {
    use TaskState::*;
    assert!(Pending.can_transition_to(Running));
    assert!(Running.can_transition_to(Completed));
    assert!(Running.can_transition_to(Failed));
    assert!(Failed.can_transition_to(Reported));
    assert!(!Pending.can_transition_to(Reported));
    assert!(!Completed.can_transition_to(Failed));
    assert!(!Reported.can_transition_to(Running));
}

#[tokio::test]
async fn test_panicking_checker_fails_only_its_category() {
    let fixture = Fixture::new();
    let coordinator = CheckCoordinator::new(fixture.registry().with(Arc::new(PanickingChecker)));

    let response = coordinator
        .check(request(vec![
            (Category::LdapUsers, vec!["cn=ops"]),
            (Category::DbUsers, vec!["bob", "alice"]),
        ]))
        .await
        .unwrap();

    let ldap = response.report.get(Category::LdapUsers).unwrap();
    assert!(ldap.failed);
    assert!(ldap
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("category task failed"));
    assert_eq!(absent(&response, Category::DbUsers), ["bob"]);

    let task = response
        .tasks
        .iter()
        .find(|t| t.category == Category::LdapUsers)
        .unwrap();
    assert_eq!(task.state, TaskState::Reported);
    assert_eq!(task.terminal, Some(TaskState::Failed));
}

// ============================================================
// Section 3: Request isolation
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_leak() {
    let fixture = Fixture::new().with_identities(
        MemoryIdentityProvider::new().with_latency(Duration::from_millis(5)),
    );
    let coordinator = fixture.coordinator();

    let requests = (0..16).map(|i| {
        let coordinator = coordinator.clone();
        async move {
            let names: Vec<String> = (0..10).map(|j| format!("req{i}-user{j}")).collect();
            let request = CheckRequest::new([
                (Category::IamUsers, names.clone()),
                (Category::DbUsers, names.clone()),
            ])
            .unwrap();
            let response = coordinator.check(request).await.unwrap();
            (i, names, response)
        }
    });

    for (i, mut names, response) in join_all(requests).await {
        names.sort();
        let prefix = format!("req{i}-");
        for category in [Category::IamUsers, Category::DbUsers] {
            let got = absent(&response, category);
            assert_eq!(got, names, "request {i} {category}");
            assert!(got.iter().all(|n| n.starts_with(&prefix)));
        }
    }
    assert_eq!(fixture.limiter.in_flight(), 0);
}

#[tokio::test]
async fn test_request_id_propagated() {
    let coordinator = Fixture::new().coordinator();
    let response = coordinator
        .check_with(
            request(vec![(Category::DbUsers, vec!["bob"])]),
            CheckOptions::default().with_request_id("req-abc"),
        )
        .await
        .unwrap();
    assert_eq!(response.request_id, "req-abc");

    let generated = coordinator
        .check(request(vec![(Category::DbUsers, vec!["bob"])]))
        .await
        .unwrap();
    assert_ne!(generated.request_id, response.request_id);
    assert!(!generated.request_id.is_empty());
}

// ============================================================
// Section 4: Deadlines and cancellation
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_fails_unfinished_categories() {
    let fixture = Fixture::new().with_identities(
        MemoryIdentityProvider::with_identities(["svc-x"]).with_latency(Duration::from_secs(60)),
    );
    let coordinator = fixture
        .coordinator()
        .with_request_timeout(Duration::from_secs(2));

    let response = coordinator
        .check(request(vec![
            (Category::IamUsers, vec!["svc-x", "svc-y", "svc-z", "a", "b", "c"]),
            (Category::DbUsers, vec!["alice", "bob"]),
        ]))
        .await
        .unwrap();

    let iam = response.report.get(Category::IamUsers).unwrap();
    assert!(iam.failed);
    assert_eq!(iam.failure_reason.as_deref(), Some(CANCELLED_REASON));
    assert!(iam.absent.is_empty());
    assert_eq!(iam.failed_candidates, 6);

    assert_eq!(absent(&response, Category::DbUsers), ["bob"]);
    assert!(!response.report.get(Category::DbUsers).unwrap().failed);

    assert_eq!(fixture.limiter.in_flight(), 0);
    assert_eq!(fixture.limiter.available(), fixture.limiter.capacity());
    assert_eq!(fixture.identities.in_flight(), 0);
}

#[tokio::test]
async fn test_parent_cancellation_reaches_tasks() {
    let observed = Arc::new(AtomicBool::new(false));
    let coordinator = CheckCoordinator::new(CheckerRegistry::new().with(Arc::new(BlockingChecker {
        observed_cancel: Arc::clone(&observed),
    })));
    let parent = CancellationToken::new();

    let trigger = parent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let response = coordinator
        .check_with(
            request(vec![(Category::AdUsers, vec!["jdoe"])]),
            CheckOptions::default().with_parent_cancel(parent),
        )
        .await
        .unwrap();

    assert!(observed.load(Ordering::SeqCst));
    let ad = response.report.get(Category::AdUsers).unwrap();
    assert_eq!(ad.failure_reason.as_deref(), Some(CANCELLED_REASON));
}

#[tokio::test]
async fn test_dropping_request_cancels_tasks() {
    let observed = Arc::new(AtomicBool::new(false));
    let identities =
        Arc::new(MemoryIdentityProvider::new().with_latency(Duration::from_secs(60)));
    let limiter = ConcurrencyLimiter::new("iam", 2);
    let coordinator = CheckCoordinator::new(
        CheckerRegistry::new()
            .with(Arc::new(BlockingChecker {
                observed_cancel: Arc::clone(&observed),
            }))
            .with(Arc::new(CloudIdentityChecker::new(
                Arc::clone(&identities),
                limiter.clone(),
            ))),
    );

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        coordinator.check(request(vec![
            (Category::AdUsers, vec!["jdoe"]),
            (Category::IamUsers, vec!["a", "b", "c"]),
        ])),
    )
    .await;
    assert!(result.is_err());

    // Aborted tasks are torn down by the runtime shortly after the drop.
    for _ in 0..100 {
        if limiter.in_flight() == 0 && identities.in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(limiter.in_flight(), 0);
    assert_eq!(limiter.available(), 2);
    assert_eq!(identities.in_flight(), 0);
}

#[tokio::test]
async fn test_cancelled_parent_skips_every_source() {
    let fixture = Fixture::new();
    let coordinator = fixture.coordinator();
    let parent = CancellationToken::new();
    parent.cancel();

    let response = coordinator
        .check_with(
            request(vec![
                (Category::DbUsers, vec!["alice", "bob"]),
                (Category::IamUsers, vec!["svc-x", "svc-y"]),
                (Category::OsUsers, vec!["T232323"]),
                (Category::AdUsers, vec!["jdoe"]),
            ]),
            CheckOptions::default().with_parent_cancel(parent),
        )
        .await
        .unwrap();

    assert_eq!(response.report.len(), 4);
    for (category, result) in response.report.iter() {
        assert!(result.failed, "{category} should be failed");
        assert_eq!(result.failure_reason.as_deref(), Some(CANCELLED_REASON));
        assert!(result.absent.is_empty(), "{category} reported absentees");
    }

    assert_eq!(fixture.users.query_count(), 0);
    assert_eq!(fixture.identities.lookup_count(), 0);
    assert_eq!(fixture.objects.fetch_count(), 0);
    assert_eq!(fixture.limiter.available(), fixture.limiter.capacity());
}

/// A checker that ignores cancellation still holds the barrier open, and its
/// answers are reported once it finishes.
#[tokio::test(start_paused = true)]
async fn test_barrier_waits_for_checker_ignoring_cancellation() {
    let fixture = Fixture::new().with_identities(
        MemoryIdentityProvider::with_identities(["svc-x"]).with_latency(Duration::from_secs(60)),
    );
    let coordinator = CheckCoordinator::new(fixture.registry().with(Arc::new(
        UncooperativeChecker {
            delay: Duration::from_secs(5),
        },
    )))
    .with_request_timeout(Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    let response = coordinator
        .check(request(vec![
            (Category::LdapUsers, vec!["cn=admin"]),
            (Category::IamUsers, vec!["svc-x"]),
        ]))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));

    let ldap = response.report.get(Category::LdapUsers).unwrap();
    assert!(!ldap.failed);
    assert_eq!(ldap.absent, ["cn=admin"]);

    let iam = response.report.get(Category::IamUsers).unwrap();
    assert_eq!(iam.failure_reason.as_deref(), Some(CANCELLED_REASON));
    assert_eq!(fixture.limiter.in_flight(), 0);
    assert!(response
        .tasks
        .iter()
        .all(|task| task.state == TaskState::Reported));
}
