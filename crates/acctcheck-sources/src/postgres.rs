//! PostgreSQL user store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, instrument};

use crate::error::{HealthStatus, SourceError, SourceResult};
use crate::traits::{healthy, validate_candidate, validate_sql_identifier, UserStore};

/// Default query timeout in seconds.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

/// Default health check timeout in seconds.
/// Shorter than the query timeout so readiness probes answer quickly.
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default account table, matching the legacy schema.
pub const DEFAULT_TABLE: &str = "dbuserpassword";

/// Default account name column, matching the legacy schema.
pub const DEFAULT_COLUMN: &str = "dbuser";

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection acquire timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-query timeout in seconds. A query exceeding it is abandoned and
    /// reported as `SourceError::QueryTimeout`.
    pub query_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
    /// Table holding one row per database account.
    pub table: String,
    /// Column holding the account name.
    pub column: String,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("health_check_timeout_secs", &self.health_check_timeout_secs)
            .field("table", &self.table)
            .field("column", &self.column)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/acctcheck".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 5,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            table: DEFAULT_TABLE.to_string(),
            column: DEFAULT_COLUMN.to_string(),
        }
    }
}

/// Builds the existence query for the given table and column.
///
/// Both identifiers must already have passed [`validate_sql_identifier`].
fn build_exists_query(table: &str, column: &str) -> String {
    format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE {column} = $1)")
}

/// Classifies a sqlx error as a connection or query failure.
fn map_sqlx_error(err: sqlx::Error, context: &str) -> SourceError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SourceError::ConnectionError {
            message: format!("{context}: {err}"),
        },
        other => SourceError::QueryError {
            message: format!("{context}: {other}"),
        },
    }
}

/// PostgreSQL implementation of [`UserStore`].
pub struct PostgresUserStore {
    pool: PgPool,
    table: String,
    column: String,
    exists_query: String,
    query_timeout: Duration,
    health_check_timeout: Duration,
}

impl PostgresUserStore {
    /// Creates a store over an existing pool with default timeouts.
    pub fn new(pool: PgPool, table: &str, column: &str) -> SourceResult<Self> {
        validate_sql_identifier(table)?;
        validate_sql_identifier(column)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            column: column.to_string(),
            exists_query: build_exists_query(table, column),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
        })
    }

    /// Connects a new pool using the given configuration.
    #[instrument(skip(config))]
    pub async fn from_config(config: &PostgresConfig) -> SourceResult<Self> {
        validate_sql_identifier(&config.table)?;
        validate_sql_identifier(&config.column)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| SourceError::ConnectionError {
                message: e.to_string(),
            })?;

        let mut store = Self::new(pool, &config.table, &config.column)?;
        store.query_timeout = Duration::from_secs(config.query_timeout_secs);
        store.health_check_timeout = Duration::from_secs(config.health_check_timeout_secs);
        Ok(store)
    }

    /// Wraps an async operation with a timeout and records query metrics.
    ///
    /// # Metrics
    /// - `acctcheck_source_query_duration_seconds` - Histogram of query durations
    /// - `acctcheck_source_query_timeout_total` - Counter of timeout events
    async fn execute_with_timeout_and_metrics<T, F>(
        &self,
        operation: &str,
        timeout: Duration,
        future: F,
    ) -> SourceResult<T>
    where
        F: std::future::Future<Output = SourceResult<T>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, future).await;
        let duration = start.elapsed().as_secs_f64();

        let (status, final_result) = match result {
            Ok(Ok(value)) => ("success", Ok(value)),
            Ok(Err(e)) => ("error", Err(e)),
            Err(_elapsed) => (
                "timeout",
                Err(SourceError::QueryTimeout {
                    operation: operation.to_string(),
                    timeout,
                }),
            ),
        };

        metrics::histogram!(
            "acctcheck_source_query_duration_seconds",
            "operation" => operation.to_string(),
            "backend" => "postgres",
            "status" => status.to_string()
        )
        .record(duration);

        if status == "timeout" {
            metrics::counter!(
                "acctcheck_source_query_timeout_total",
                "operation" => operation.to_string(),
                "backend" => "postgres"
            )
            .increment(1);
        }

        final_result
    }

    /// Creates the account table and its lookup index if they do not exist.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> SourceResult<()> {
        debug!(table = %self.table, "Running database migrations");

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                {column} VARCHAR(255) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
            table = self.table,
            column = self.column,
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "failed to create account table"))?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table} ({column})",
            table = self.table,
            column = self.column,
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "failed to create account index"))?;

        Ok(())
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self))]
    async fn exists(&self, candidate: &str) -> SourceResult<bool> {
        validate_candidate(candidate)?;
        self.execute_with_timeout_and_metrics("exists", self.query_timeout, async {
            sqlx::query_scalar::<_, bool>(&self.exists_query)
                .bind(candidate)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "existence query failed"))
        })
        .await
    }

    async fn health_check(&self) -> SourceResult<HealthStatus> {
        let started = Instant::now();
        self.execute_with_timeout_and_metrics("health_check", self.health_check_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "health check failed"))
        })
        .await?;

        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        metrics::gauge!("acctcheck_source_pool_connections", "backend" => "postgres", "state" => "active")
            .set(f64::from(size.saturating_sub(idle)));
        metrics::gauge!("acctcheck_source_pool_connections", "backend" => "postgres", "state" => "idle")
            .set(f64::from(idle));

        Ok(healthy("postgres", started))
    }
}
