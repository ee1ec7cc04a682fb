//! HTTP API endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/check` | POST | Check the posted candidate lists |
//! | `/check` | GET | Check the configured default lists |
//! | `/health` | GET | Liveness |
//! | `/ready` | GET | Readiness (database probe) |
//! | `/metrics` | GET | Prometheus exposition |
//!
//! A check answers 200 even when some categories failed; those carry
//! `"failed": true` and a `failure_reason`.

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_body_limit, create_router_with_observability,
    create_router_with_observability_and_limit, ApiError, JsonBadRequest, DEFAULT_BODY_LIMIT,
    DEFAULT_METRICS_PATH,
};
pub use state::{AppState, StartupError, IDENTITY_LIMITER_NAME};
