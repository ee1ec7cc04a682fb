//! acctcheck-api: HTTP API layer
//!
//! This crate provides:
//! - HTTP endpoints via Axum (`/check`, `/health`, `/ready`, `/metrics`)
//! - Middleware (request id, tracing, logging, metrics)
//! - Observability setup (logging, Jaeger tracing, Prometheus metrics)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               acctcheck-api                 │
//! ├─────────────────────────────────────────────┤
//! │  http/          - Routes and app wiring     │
//! │  middleware/    - Request id, spans, metrics│
//! │  observability/ - Logging, tracing, metrics │
//! └─────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod middleware;
pub mod observability;
