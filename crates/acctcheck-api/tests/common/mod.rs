//! Shared helpers for acctcheck API integration tests.

// Each test file uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use acctcheck_api::http::{create_router, AppState};
use acctcheck_domain::{
    Category, CloudIdentityChecker, ConcurrencyLimiter, DatabaseChecker, DirectoryChecker,
    DirectoryStubMode, ObjectListChecker,
};
use acctcheck_server::{CheckCoordinator, CheckerRegistry};
use acctcheck_sources::{MemoryIdentityProvider, MemoryObjectStore, MemoryUserStore};

/// Key the OS account list is stored under.
pub const OBJECT_KEY: &str = "userlist";

/// Limiter capacity used by [`TestSources::default`].
pub const IDENTITY_CONCURRENCY: usize = 3;

/// In-memory collaborators behind a test app.
pub struct TestSources {
    pub users: Arc<MemoryUserStore>,
    pub identities: Arc<MemoryIdentityProvider>,
    pub objects: Arc<MemoryObjectStore>,
    pub limiter: ConcurrencyLimiter,
    pub ldap_mode: DirectoryStubMode,
    pub request_timeout: Option<Duration>,
}

impl Default for TestSources {
    fn default() -> Self {
        let objects = Arc::new(MemoryObjectStore::new());
        objects.put(OBJECT_KEY, "# os accounts\nroot\nT232323\nZ121212\n");
        Self {
            users: Arc::new(MemoryUserStore::with_users(["alice", "dbuser1", "dbuser2"])),
            identities: Arc::new(MemoryIdentityProvider::with_identities([
                "svc-x",
                "iamuser1",
                "iamuser2",
            ])),
            objects,
            limiter: ConcurrencyLimiter::new("iam_users", IDENTITY_CONCURRENCY),
            ldap_mode: DirectoryStubMode::AllFound,
            request_timeout: None,
        }
    }
}

impl TestSources {
    pub fn with_identities(mut self, identities: MemoryIdentityProvider) -> Self {
        self.identities = Arc::new(identities);
        self
    }

    pub fn with_ldap_mode(mut self, mode: DirectoryStubMode) -> Self {
        self.ldap_mode = mode;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> AppState {
        let registry = CheckerRegistry::new()
            .with(Arc::new(DatabaseChecker::new(Arc::clone(&self.users))))
            .with(Arc::new(CloudIdentityChecker::new(
                Arc::clone(&self.identities),
                self.limiter.clone(),
            )))
            .with(Arc::new(ObjectListChecker::new(
                Arc::clone(&self.objects),
                OBJECT_KEY,
            )))
            .with(Arc::new(DirectoryChecker::new(
                Category::AdUsers,
                DirectoryStubMode::AllFound,
            )))
            .with(Arc::new(DirectoryChecker::new(
                Category::LdapUsers,
                self.ldap_mode,
            )));

        let mut coordinator = CheckCoordinator::new(registry);
        if let Some(timeout) = self.request_timeout {
            coordinator = coordinator.with_request_timeout(timeout);
        }
        AppState::new(coordinator, Arc::clone(&self.users) as _)
    }
}

/// Router over fresh per-app state sharing `sources`' collaborators.
pub fn create_test_app(sources: &TestSources) -> axum::Router {
    create_router(sources.state())
}

async fn into_json(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Non-JSON bodies are kept as `raw_body` so assertions can show them.
    let json = if body.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            serde_json::json!({ "raw_body": String::from_utf8_lossy(&body).to_string() })
        })
    };
    (status, json)
}

/// POSTs `body` as JSON and returns status plus parsed response.
pub async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_raw(app, uri, &serde_json::to_string(&body).unwrap()).await
}

/// POSTs a raw string with a JSON content type.
pub async fn post_raw(app: axum::Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    into_json(response).await
}

/// GETs `uri` and returns status plus parsed response.
pub async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    into_json(response).await
}
