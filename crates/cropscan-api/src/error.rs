//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cropscan_inference::InferenceError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Detail returned in place of internal error messages in production.
pub const REDACTED_DETAIL: &str = "An internal error occurred";

/// Response extension marking a body that carries internal error details.
#[derive(Debug, Clone, Copy)]
pub struct InternalErrorDetail;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Rate limited")]
    RateLimited,

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Inference(#[from] InferenceError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Inference(e) => match e {
                InferenceError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InferenceError::InvalidImage(_)
                | InferenceError::ModelLoad { .. }
                | InferenceError::ClassCountMismatch { .. }
                | InferenceError::Inference(_)
                | InferenceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let code = match &self {
            ApiError::Inference(e) => Some(e.kind()),
            _ => None,
        };
        let internal = matches!(self, ApiError::Internal(_));

        let body = ErrorResponse {
            detail: self.to_string(),
            code,
        };
        let mut response = (status, Json(body)).into_response();
        if internal {
            response.extensions_mut().insert(InternalErrorDetail);
        }
        response
    }
}

/// Generic 500 body used when internal details are hidden.
pub fn redacted_response() -> Response {
    let body = ErrorResponse {
        detail: REDACTED_DETAIL.to_string(),
        code: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
