//! Axum HTTP API server.
//!
//! This crate provides:
//! - Per-model prediction endpoints backed by the model registry
//! - Liveness, readiness and model listing routes
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, ModelConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
