//! OpenTelemetry tracing with Jaeger export.
//!
//! One check request produces a `check_request` span, a `category_check` span
//! per dispatched category and a `candidate_check` span per identity lookup,
//! all under the `http_request` span of the middleware. They reach Jaeger
//! through the `tracing-opentelemetry` bridge:
//!
//! ```text
//! tracing::span!()  -->  tracing-opentelemetry  -->  OpenTelemetry SDK  -->  Jaeger agent (UDP)
//! ```

use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::Tracer;

use acctcheck_server::config::TracingSettings;

/// Instrumentation scope name reported to the collector.
const INSTRUMENTATION_NAME: &str = "acctcheck";

/// Jaeger export settings resolved from [`TracingSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Service name attached to exported spans.
    pub service_name: String,
    /// Jaeger agent endpoint (UDP `host:port`).
    pub jaeger_endpoint: String,
    /// Whether export is enabled.
    pub enabled: bool,
}

impl TracingConfig {
    pub fn from_settings(settings: &TracingSettings) -> Self {
        Self {
            service_name: settings.service_name.clone(),
            jaeger_endpoint: settings.jaeger_endpoint.clone(),
            enabled: settings.enabled,
        }
    }

    /// Checks that the agent endpoint is `host:port` with a numeric port.
    ///
    /// The agent pipeline only reports a bad endpoint when the first batch is
    /// flushed, long after startup.
    fn validate(&self) -> Result<(), TracingError> {
        let invalid = |reason: &str| TracingError::InvalidEndpoint {
            endpoint: self.jaeger_endpoint.clone(),
            reason: reason.to_string(),
        };

        let (host, port) = self
            .jaeger_endpoint
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port"))?;
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        match port.parse::<u16>() {
            Ok(0) | Err(_) => Err(invalid("port must be 1-65535")),
            Ok(_) => Ok(()),
        }
    }
}

/// Tracing initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("invalid Jaeger agent endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to initialize Jaeger exporter: {0}")]
    JaegerInit(String),

    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Creates a Jaeger tracer and registers its provider globally so that
/// [`shutdown_tracing`] can flush it.
///
/// Batches are split to fit the agent's UDP packet size: a request with many
/// identity candidates emits one span per lookup.
pub fn create_jaeger_tracer(config: &TracingConfig) -> Result<Tracer, TracingError> {
    config.validate()?;

    let provider = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(&config.service_name)
        .with_endpoint(&config.jaeger_endpoint)
        .with_auto_split_batch(true)
        .build_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|e| TracingError::JaegerInit(e.to_string()))?;

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(provider.tracer(INSTRUMENTATION_NAME))
}

/// Flushes pending spans. Call before the process exits.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> TracingConfig {
        TracingConfig::from_settings(&TracingSettings {
            enabled: true,
            jaeger_endpoint: endpoint.to_string(),
            ..TracingSettings::default()
        })
    }

    #[test]
    fn test_config_from_settings() {
        let settings = TracingSettings::default();
        let config = TracingConfig::from_settings(&settings);
        assert_eq!(config.service_name, settings.service_name);
        assert_eq!(config.jaeger_endpoint, "localhost:6831");
        assert!(!config.enabled);
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(config("localhost:6831").validate().is_ok());
        assert!(config("jaeger.observability.svc:6831").validate().is_ok());
        assert!(config("[::1]:6831").validate().is_ok());

        for endpoint in ["localhost", ":6831", "localhost:0", "localhost:udp", "localhost:70000"] {
            match config(endpoint).validate() {
                Err(TracingError::InvalidEndpoint { endpoint: got, .. }) => {
                    assert_eq!(got, endpoint)
                }
                other => panic!("{endpoint}: expected invalid endpoint, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_before_pipeline_starts() {
        match create_jaeger_tracer(&config("jaeger-agent")) {
            Err(err) => assert!(err.to_string().contains("jaeger-agent")),
            Ok(_) => panic!("expected invalid endpoint"),
        }
    }

    /// Exports one request/category span pair to a local Jaeger agent.
    ///
    /// Start Jaeger with
    /// `docker run -d -p 6831:6831/udp -p 16686:16686 jaegertracing/all-in-one`
    /// and inspect the result at http://localhost:16686.
    #[tokio::test]
    #[ignore = "requires running Jaeger instance - manual verification"]
    async fn test_check_spans_exported_to_jaeger() {
        use tracing_subscriber::{layer::SubscriberExt, Registry};

        let tracer = create_jaeger_tracer(&config("localhost:6831")).expect("tracer");
        let subscriber = Registry::default().with(tracing_opentelemetry::layer().with_tracer(tracer));

        tracing::subscriber::with_default(subscriber, || {
            let request = tracing::info_span!("check_request", request_id = "jaeger-smoke");
            let _request = request.enter();
            let category = tracing::info_span!("category_check", category = "DbUsers", candidates = 2);
            let _category = category.enter();
            tracing::info!("category check finished");
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown_tracing();
    }
}
