//! Observability infrastructure.
//!
//! - Structured logging (`tracing-subscriber`, text or JSON)
//! - OpenTelemetry tracing exported to Jaeger
//! - Prometheus metrics endpoint

mod logging;
mod metrics;
mod tracing;

pub use self::logging::{create_json_layer, init_logging, parse_log_level, LoggingConfig};
pub use self::metrics::{init_metrics, metrics_handler, MetricsError, MetricsState};
pub use self::tracing::{create_jaeger_tracer, shutdown_tracing, TracingConfig, TracingError};

use tracing_subscriber::{fmt, prelude::*};

/// Installs the global subscriber: env filter, log formatter and, when
/// `tracing` is given and enabled, the OpenTelemetry layer.
///
/// Fails if a global subscriber is already installed.
pub fn init_observability(
    logging: LoggingConfig,
    tracing: Option<TracingConfig>,
) -> Result<(), TracingError> {
    let otel_layer = match tracing.filter(|config| config.enabled) {
        Some(config) => {
            let tracer = create_jaeger_tracer(&config)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let span_events = logging.span_events();
    let (json_layer, text_layer) = if logging.json_format {
        let layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_current_span(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        (Some(layer), None)
    } else {
        let layer = fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_target(true);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(logging.filter())
        .with(otel_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TracingError::SubscriberInit(e.to_string()))
}
