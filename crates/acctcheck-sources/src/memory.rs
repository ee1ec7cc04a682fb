//! In-memory source implementations.
//!
//! Used by tests and by the `memory` backends in configuration. Each store can
//! be told to fail or to stall so that failure isolation and concurrency bounds
//! can be exercised without real infrastructure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::instrument;

use crate::error::{HealthStatus, SourceError, SourceResult, NO_SUCH_KEY};
use crate::traits::{healthy, validate_candidate, IdentityProvider, Lookup, ObjectStore, UserStore};

/// In-memory account table.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashSet<String>,
    /// Candidates whose query fails with the stored error.
    failures: DashMap<String, SourceError>,
    /// When set, every query fails with this error (simulates a lost connection).
    outage: RwLock<Option<SourceError>>,
    latency: Option<Duration>,
    queries: AtomicUsize,
}

impl MemoryUserStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given users.
    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for user in users {
            store.users.insert(user.into());
        }
        store
    }

    /// Delays every query by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds a user.
    pub fn insert(&self, user: impl Into<String>) {
        self.users.insert(user.into());
    }

    /// Makes queries for `candidate` fail with `error`.
    pub fn fail_candidate(&self, candidate: impl Into<String>, error: SourceError) {
        self.failures.insert(candidate.into(), error);
    }

    /// Makes every query fail with `error` until [`MemoryUserStore::restore`].
    pub fn fail_all(&self, error: SourceError) {
        *self.outage.write().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Clears a previous [`MemoryUserStore::fail_all`].
    pub fn restore(&self) {
        *self.outage.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of existence queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn current_outage(&self) -> Option<SourceError> {
        self.outage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, candidate: &str) -> SourceResult<bool> {
        validate_candidate(candidate)?;
        self.queries.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.current_outage() {
            return Err(err);
        }
        if let Some(err) = self.failures.get(candidate) {
            return Err(err.value().clone());
        }
        Ok(self.users.contains(candidate))
    }

    async fn health_check(&self) -> SourceResult<HealthStatus> {
        let started = Instant::now();
        if let Some(err) = self.current_outage() {
            return Err(err);
        }
        Ok(healthy("memory", started))
    }
}

/// In-memory identity provider with an instrumented in-flight counter.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    identities: DashSet<String>,
    faults: DashMap<String, (String, String)>,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
    lookups: AtomicUsize,
}

impl MemoryIdentityProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that knows the given identities.
    pub fn with_identities<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for identity in identities {
            provider.identities.insert(identity.into());
        }
        provider
    }

    /// Delays every lookup by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Registers an identity.
    pub fn insert(&self, identity: impl Into<String>) {
        self.identities.insert(identity.into());
    }

    /// Makes lookups of `candidate` fail with a provider error.
    pub fn fail_candidate(
        &self,
        candidate: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.faults
            .insert(candidate.into(), (code.into(), message.into()));
    }

    /// Number of lookups currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous lookups observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of lookups started so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter when a lookup ends, including when the
/// lookup future is dropped mid-flight.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    #[instrument(skip(self), level = "debug")]
    async fn lookup(&self, candidate: &str) -> SourceResult<Lookup> {
        validate_candidate(candidate)?;
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(fault) = self.faults.get(candidate) {
            let (code, message) = fault.value().clone();
            return Err(SourceError::Provider { code, message });
        }

        if self.identities.contains(candidate) {
            Ok(Lookup::Found)
        } else {
            Ok(Lookup::NotFound)
        }
    }
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
    failures: DashMap<String, SourceError>,
    fetches: AtomicUsize,
}

impl MemoryObjectStore {
    /// Creates an empty object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `contents` under `key`.
    pub fn put(&self, key: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.objects.insert(key.into(), contents.into());
    }

    /// Makes fetches of `key` fail with `error`.
    pub fn fail_key(&self, key: impl Into<String>, error: SourceError) {
        self.failures.insert(key.into(), error);
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, key: &str) -> SourceResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.failures.get(key) {
            return Err(err.value().clone());
        }
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SourceError::FetchError {
                key: key.to_string(),
                code: NO_SUCH_KEY.to_string(),
                message: "the specified key does not exist".to_string(),
            })
    }
}
