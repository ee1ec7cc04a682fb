//! Configuration management for the acctcheck server.
//!
//! Configuration is layered from three sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values, which take
//! precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use acctcheck_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use acctcheck_domain::checker::DEFAULT_OBJECT_KEY;
use acctcheck_domain::{Category, CheckRequest, DirectoryStubMode, DEFAULT_MAX_CONCURRENCY};
use acctcheck_sources::{validate_sql_identifier, PostgresConfig, DEFAULT_COLUMN, DEFAULT_TABLE};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `ACCTCHECK_SERVER__PORT`.
pub const ENV_PREFIX: &str = "ACCTCHECK";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Account database settings (DbUsers)
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Cloud identity provider settings (IamUsers)
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Object-hosted account list settings (OsUsers)
    #[serde(default)]
    pub object_list: ObjectListSettings,

    /// Directory stand-in settings (AdUsers, LdapUsers)
    #[serde(default)]
    pub directory: DirectorySettings,

    /// Candidates checked by `GET /check`
    #[serde(default)]
    pub defaults: DefaultCandidates,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Tracing settings
    #[serde(default)]
    pub tracing: TracingSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for one check request, in seconds. When it elapses, unfinished
    /// work is cancelled and reported as failed.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerSettings {
    /// Request deadline as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

/// Account database settings.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
pub struct DatabaseSettings {
    /// Backend type: "memory" or "postgres"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Database connection URL (required if backend is "postgres")
    pub database_url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Per-query timeout in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Account table
    #[serde(default = "default_table")]
    pub table: String,

    /// Account name column
    #[serde(default = "default_column")]
    pub column: String,

    /// Create the account table on startup if it is missing
    #[serde(default)]
    pub run_migrations: bool,

    /// Accounts present in the "memory" backend
    #[serde(default)]
    pub known_users: Vec<String>,
}

// Hide credentials embedded in database_url.
impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("backend", &self.backend)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("pool_size", &self.pool_size)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("table", &self.table)
            .field("column", &self.column)
            .field("run_migrations", &self.run_migrations)
            .field("known_users", &self.known_users.len())
            .finish()
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
            query_timeout_secs: default_query_timeout(),
            table: default_table(),
            column: default_column(),
            run_migrations: false,
            known_users: Vec::new(),
        }
    }
}

impl DatabaseSettings {
    /// PostgreSQL connection settings, or `None` unless the backend is postgres.
    pub fn postgres_config(&self) -> Option<PostgresConfig> {
        if self.backend != "postgres" {
            return None;
        }
        let database_url = self.database_url.clone()?;
        Some(PostgresConfig {
            database_url,
            max_connections: self.pool_size,
            connect_timeout_secs: self.connection_timeout_secs,
            query_timeout_secs: self.query_timeout_secs,
            table: self.table.clone(),
            column: self.column.clone(),
            ..Default::default()
        })
    }
}

fn default_memory_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_query_timeout() -> u64 {
    10
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_column() -> String {
    DEFAULT_COLUMN.to_string()
}

/// Cloud identity provider settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IdentitySettings {
    /// Backend type: "memory" or "http"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Provider base URL (required if backend is "http")
    pub endpoint: Option<String>,

    /// Per-lookup timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,

    /// Maximum simultaneous lookups, shared by every request
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Identities present in the "memory" backend
    #[serde(default)]
    pub known_identities: Vec<String>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            endpoint: None,
            timeout_secs: default_remote_timeout(),
            max_concurrency: default_max_concurrency(),
            known_identities: Vec::new(),
        }
    }
}

fn default_remote_timeout() -> u64 {
    10
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

/// Object-hosted account list settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ObjectListSettings {
    /// Backend type: "memory" or "http"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Object store base URL (required if backend is "http")
    pub endpoint: Option<String>,

    /// Key of the account list object
    #[serde(default = "default_object_key")]
    pub key: String,

    /// Fetch timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,

    /// Contents served under `key` by the "memory" backend. When unset the
    /// memory store is empty and every fetch fails.
    pub inline_contents: Option<String>,
}

impl Default for ObjectListSettings {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            endpoint: None,
            key: default_object_key(),
            timeout_secs: default_remote_timeout(),
            inline_contents: None,
        }
    }
}

fn default_object_key() -> String {
    DEFAULT_OBJECT_KEY.to_string()
}

/// Directory stand-in settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DirectorySettings {
    /// Behaviour for AdUsers
    #[serde(default)]
    pub ad_mode: DirectoryStubMode,

    /// Behaviour for LdapUsers
    #[serde(default)]
    pub ldap_mode: DirectoryStubMode,
}

/// Candidate lists checked by `GET /check`.
///
/// One field per category; keys are snake_case because environment and file
/// keys are case-insensitive.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DefaultCandidates {
    #[serde(default)]
    pub db_users: Vec<String>,
    #[serde(default)]
    pub iam_users: Vec<String>,
    #[serde(default)]
    pub os_users: Vec<String>,
    #[serde(default)]
    pub ad_users: Vec<String>,
    #[serde(default)]
    pub ldap_users: Vec<String>,
}

impl Default for DefaultCandidates {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        Self {
            db_users: owned(&["dbuser1", "dbuser2", "dbuser4", "dbuser5", "dbuser7"]),
            iam_users: owned(&["iamuser1", "iamuser2", "iamuser3", "iamuser4", "iamuser5"]),
            os_users: owned(&[
                "T232323", "Z121212", "Z343434", "M565656", "M090909", "M101010", "K232323",
            ]),
            ad_users: Vec::new(),
            ldap_users: Vec::new(),
        }
    }
}

impl DefaultCandidates {
    /// Builds the check request for these lists. Empty lists are left out.
    pub fn to_request(&self) -> acctcheck_domain::DomainResult<CheckRequest> {
        let lists = [
            (Category::DbUsers, &self.db_users),
            (Category::IamUsers, &self.iam_users),
            (Category::OsUsers, &self.os_users),
            (Category::AdUsers, &self.ad_users),
            (Category::LdapUsers, &self.ldap_users),
        ];
        CheckRequest::new(
            lists
                .into_iter()
                .filter(|(_, names)| !names.is_empty())
                .map(|(category, names)| (category, names.iter().cloned())),
        )
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Enable metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Tracing settings (OpenTelemetry/Jaeger).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TracingSettings {
    /// Enable distributed tracing
    #[serde(default)]
    pub enabled: bool,

    /// Jaeger agent endpoint
    #[serde(default = "default_jaeger_endpoint")]
    pub jaeger_endpoint: String,

    /// Service name for traces
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            jaeger_endpoint: default_jaeger_endpoint(),
            service_name: default_service_name(),
        }
    }
}

fn default_jaeger_endpoint() -> String {
    "localhost:6831".to_string()
}

fn default_service_name() -> String {
    "acctcheck".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

fn check_backend(section: &str, backend: &str, valid: &[&str]) -> Result<(), ConfigLoadError> {
    if valid.contains(&backend) {
        Ok(())
    } else {
        Err(invalid(format!(
            "{section}.backend must be one of: {valid:?}, got: {backend}"
        )))
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `ACCTCHECK_` and use `__` as separator:
    /// - `ACCTCHECK_SERVER__PORT=9090` overrides `server.port`
    /// - `ACCTCHECK_DATABASE__DATABASE_URL=...` overrides `database.database_url`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(Self::environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(Self::environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    // ACCTCHECK_SERVER__PORT -> server.port
    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(invalid("server.request_timeout_secs must be greater than 0"));
        }

        check_backend("database", &self.database.backend, &["memory", "postgres"])?;
        if self.database.backend == "postgres" && is_blank(self.database.database_url.as_deref()) {
            return Err(invalid(
                "database.database_url is required when backend is 'postgres'",
            ));
        }
        validate_sql_identifier(&self.database.table)
            .map_err(|e| invalid(format!("database.table: {e}")))?;
        validate_sql_identifier(&self.database.column)
            .map_err(|e| invalid(format!("database.column: {e}")))?;

        check_backend("identity", &self.identity.backend, &["memory", "http"])?;
        if self.identity.backend == "http" && is_blank(self.identity.endpoint.as_deref()) {
            return Err(invalid(
                "identity.endpoint is required when backend is 'http'",
            ));
        }
        if self.identity.max_concurrency == 0 {
            return Err(invalid("identity.max_concurrency must be greater than 0"));
        }

        check_backend("object_list", &self.object_list.backend, &["memory", "http"])?;
        if self.object_list.backend == "http" && is_blank(self.object_list.endpoint.as_deref()) {
            return Err(invalid(
                "object_list.endpoint is required when backend is 'http'",
            ));
        }
        if self.object_list.key.trim().is_empty() {
            return Err(invalid("object_list.key cannot be empty"));
        }

        self.defaults
            .to_request()
            .map_err(|e| invalid(format!("defaults: {e}")))?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}
