//! Application state for HTTP handlers and its construction from config.

use std::sync::Arc;
use std::time::Duration;

use acctcheck_domain::{
    Category, CheckRequest, CloudIdentityChecker, ConcurrencyLimiter, DatabaseChecker,
    DirectoryChecker, DomainError, ObjectListChecker,
};
use acctcheck_server::config::{DatabaseSettings, IdentitySettings, ObjectListSettings};
use acctcheck_server::{CheckCoordinator, CheckerRegistry, ServerConfig};
use acctcheck_sources::{
    HttpIdentityProvider, HttpObjectStore, IdentityProvider, MemoryIdentityProvider,
    MemoryObjectStore, MemoryUserStore, ObjectStore, PostgresUserStore, SourceError, UserStore,
};
use tracing::info;

/// Name of the limiter guarding per-candidate identity lookups.
pub const IDENTITY_LIMITER_NAME: &str = "iam_users";

/// Shared state for all handlers.
///
/// Only process-wide collaborators live here. Everything request-scoped
/// (aggregator, cancellation token, trace context) is created by the
/// coordinator per call.
#[derive(Clone)]
pub struct AppState {
    /// Dispatches check requests to the registered checkers.
    pub coordinator: CheckCoordinator,
    /// Probed by the readiness endpoint.
    pub user_store: Arc<dyn UserStore>,
    /// Request served by `GET /check`.
    pub defaults: Arc<CheckRequest>,
}

/// Failures while wiring collaborators at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("invalid default candidates: {0}")]
    Defaults(#[from] DomainError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AppState {
    /// State with an empty default request.
    pub fn new(coordinator: CheckCoordinator, user_store: Arc<dyn UserStore>) -> Self {
        Self {
            coordinator,
            user_store,
            defaults: Arc::new(CheckRequest::default()),
        }
    }

    /// Sets the request served by `GET /check`.
    pub fn with_defaults(mut self, defaults: CheckRequest) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    /// Builds the collaborators, checkers and coordinator described by `config`.
    ///
    /// Connects to PostgreSQL (and runs migrations when enabled) for the
    /// postgres backend.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, StartupError> {
        let user_store = build_user_store(&config.database).await?;
        let provider = build_identity_provider(&config.identity)?;
        let objects = build_object_store(&config.object_list)?;

        let limiter = ConcurrencyLimiter::new(IDENTITY_LIMITER_NAME, config.identity.max_concurrency);
        let registry = CheckerRegistry::new()
            .with(Arc::new(DatabaseChecker::new(Arc::clone(&user_store))))
            .with(Arc::new(CloudIdentityChecker::new(provider, limiter)))
            .with(Arc::new(ObjectListChecker::new(
                objects,
                config.object_list.key.clone(),
            )))
            .with(Arc::new(DirectoryChecker::new(
                Category::AdUsers,
                config.directory.ad_mode,
            )))
            .with(Arc::new(DirectoryChecker::new(
                Category::LdapUsers,
                config.directory.ldap_mode,
            )));

        let coordinator =
            CheckCoordinator::new(registry).with_request_timeout(config.server.request_timeout());
        let defaults = config.defaults.to_request()?;

        info!(
            database = %config.database.backend,
            identity = %config.identity.backend,
            object_list = %config.object_list.backend,
            max_concurrency = config.identity.max_concurrency,
            "checkers registered"
        );

        Ok(Self::new(coordinator, user_store).with_defaults(defaults))
    }
}

async fn build_user_store(settings: &DatabaseSettings) -> Result<Arc<dyn UserStore>, StartupError> {
    match settings.backend.as_str() {
        "memory" => {
            info!(users = settings.known_users.len(), "using in-memory user store");
            Ok(Arc::new(MemoryUserStore::with_users(
                settings.known_users.iter().cloned(),
            )))
        }
        "postgres" => {
            let pg_config = settings.postgres_config().ok_or_else(|| {
                StartupError::Config("database.database_url is required for postgres".into())
            })?;

            info!(?pg_config, "connecting to PostgreSQL");
            let store = PostgresUserStore::from_config(&pg_config).await?;
            if settings.run_migrations {
                info!("running database migrations");
                store.run_migrations().await?;
            }
            Ok(Arc::new(store))
        }
        other => Err(StartupError::Config(format!(
            "unknown database backend: {other}"
        ))),
    }
}

fn build_identity_provider(
    settings: &IdentitySettings,
) -> Result<Arc<dyn IdentityProvider>, StartupError> {
    match settings.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryIdentityProvider::with_identities(
            settings.known_identities.iter().cloned(),
        ))),
        "http" => {
            let endpoint = required_endpoint("identity", settings.endpoint.as_deref())?;
            let timeout = Duration::from_secs(settings.timeout_secs);
            Ok(Arc::new(HttpIdentityProvider::new(endpoint, timeout)?))
        }
        other => Err(StartupError::Config(format!(
            "unknown identity backend: {other}"
        ))),
    }
}

fn build_object_store(settings: &ObjectListSettings) -> Result<Arc<dyn ObjectStore>, StartupError> {
    match settings.backend.as_str() {
        "memory" => {
            let store = MemoryObjectStore::new();
            if let Some(contents) = &settings.inline_contents {
                store.put(settings.key.clone(), contents.clone().into_bytes());
            }
            Ok(Arc::new(store))
        }
        "http" => {
            let endpoint = required_endpoint("object_list", settings.endpoint.as_deref())?;
            let timeout = Duration::from_secs(settings.timeout_secs);
            Ok(Arc::new(HttpObjectStore::new(endpoint, timeout)?))
        }
        other => Err(StartupError::Config(format!(
            "unknown object_list backend: {other}"
        ))),
    }
}

fn required_endpoint<'a>(section: &str, endpoint: Option<&'a str>) -> Result<&'a str, StartupError> {
    endpoint
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| StartupError::Config(format!("{section}.endpoint is required for http")))
}
