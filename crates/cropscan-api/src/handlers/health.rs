//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Root response.
#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// Static service banner. Independent of model state.
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: format!("{} is running", state.config.service_name),
    })
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
}

/// Health check endpoint (liveness).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: Vec<CheckStatus>,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub model: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(model: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            status: "error".to_string(),
            error: Some(msg.into()),
        }
    }
}

/// Readiness check endpoint (readiness).
/// Ready only when every configured model loaded.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let checks: Vec<CheckStatus> = state
        .registry
        .entries()
        .map(|entry| match entry.unavailable_reason() {
            None => CheckStatus::ok(entry.id().as_str()),
            Some(reason) => CheckStatus::error(entry.id().as_str(), reason),
        })
        .collect();

    let all_ok = !checks.is_empty() && checks.iter().all(|c| c.status == "ok");

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
