//! acctcheck server binary.
//!
//! Checks which accounts in each category (database, cloud identity, OS list,
//! directory) do not exist in their source of truth.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! acctcheck --config config.yaml
//!
//! # With environment variables only
//! ACCTCHECK_DATABASE__BACKEND=memory acctcheck
//! ```

use std::net::SocketAddr;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use acctcheck_api::http::{
    create_router, create_router_with_observability_and_limit, AppState, DEFAULT_BODY_LIMIT,
};
use acctcheck_api::observability::{
    init_metrics, init_observability, parse_log_level, shutdown_tracing, LoggingConfig,
    TracingConfig,
};
use acctcheck_server::ServerConfig;

/// acctcheck - concurrent account existence checks
#[derive(Parser, Debug)]
#[command(name = "acctcheck")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::from_env()?,
    };

    let log_config = LoggingConfig {
        json_format: config.logging.json,
        default_level: parse_log_level(&config.logging.level),
        include_spans: false,
    };
    init_observability(
        log_config,
        Some(TracingConfig::from_settings(&config.tracing)),
    )?;

    info!(?config, "configuration loaded");

    let state = AppState::from_config(&config).await?;

    let router = if config.metrics.enabled {
        let metrics_state = init_metrics()?;
        create_router_with_observability_and_limit(
            state,
            metrics_state,
            &config.metrics.path,
            DEFAULT_BODY_LIMIT,
        )
    } else {
        create_router(state)
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let result = run_http_server(router, addr).await;
    if let Err(ref e) = result {
        error!("HTTP server error: {}", e);
    }

    shutdown_tracing();
    result
}

/// Serves until a shutdown signal arrives, then drains in-flight requests.
///
/// Dropped handler futures cancel their check requests, so no category task
/// outlives the server.
async fn run_http_server(router: axum::Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
///
/// A signal source that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = Args::try_parse_from(["acctcheck"]).unwrap();
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["acctcheck", "--config", "config.yaml"]).unwrap();
        assert_eq!(args.config, Some("config.yaml".to_string()));

        let args = Args::try_parse_from(["acctcheck", "-c", "prod.yaml"]).unwrap();
        assert_eq!(args.config, Some("prod.yaml".to_string()));
    }

    #[test]
    fn test_cli_rejects_unknown_flag() {
        assert!(Args::try_parse_from(["acctcheck", "--port", "9000"]).is_err());
    }
}
