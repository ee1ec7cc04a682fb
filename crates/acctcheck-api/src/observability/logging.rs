//! Structured logging configuration.
//!
//! Log entries go through `tracing-subscriber`. With JSON output enabled each
//! entry is one object per line:
//!
//! ```json
//! {"timestamp":"2026-01-15T10:30:00.000Z","level":"INFO","target":"acctcheck_server","fields":{"message":"check request completed"}}
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// JSON output when true, pretty text otherwise.
    pub json_format: bool,
    /// Level used when `RUST_LOG` is not set.
    pub default_level: Level,
    /// Emit span enter/exit events.
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    /// JSON output at the default level.
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    /// Pretty text output at the default level.
    pub fn text() -> Self {
        Self {
            json_format: false,
            ..Default::default()
        }
    }

    /// Sets the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Includes span enter/exit events.
    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    pub(crate) fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_level.to_string()))
    }

    pub(crate) fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }
}

/// Parses a configured level name. Unknown names fall back to `INFO`.
pub fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs a logging-only global subscriber.
///
/// Later calls are no-ops. Use [`super::init_observability`] when spans should
/// also be exported.
pub fn init_logging(config: LoggingConfig) {
    let filter = config.filter();
    let span_events = config.span_events();

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        );
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true),
        );
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// JSON subscriber writing to `writer`, used to capture log output in tests.
pub fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
}
