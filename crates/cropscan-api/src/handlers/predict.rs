//! Prediction handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use cropscan_inference::ModelEntry;
use cropscan_models::Prediction;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the uploaded image.
pub const FILE_FIELD: &str = "file";

/// Classify an image with the default model.
pub async fn predict_default(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Prediction>> {
    let entry = state
        .registry
        .default_model()
        .cloned()
        .ok_or_else(|| ApiError::unavailable("No models are configured"))?;

    predict_with(state, entry, multipart).await
}

/// Classify an image with the named model.
pub async fn predict_model(
    State(state): State<AppState>,
    Path(model): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Prediction>> {
    let entry = state
        .registry
        .get_str(&model)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("Unknown model: {model}")))?;

    predict_with(state, entry, multipart).await
}

async fn predict_with(
    state: AppState,
    entry: Arc<ModelEntry>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Prediction>> {
    let model = entry.id().to_string();
    let multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let bytes = read_image_field(multipart).await?;

    let predictor = Arc::clone(&state.predictor);
    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || predictor.predict(&entry, &bytes))
        .await
        .map_err(|e| {
            metrics::record_prediction_failure(&model, "panic");
            ApiError::internal(format!("Prediction task failed: {e}"))
        })?;

    match result {
        Ok(prediction) => {
            let elapsed = start.elapsed();
            metrics::record_prediction(&model, &prediction.class_name, elapsed.as_secs_f64());
            info!(
                model = %model,
                class_name = %prediction.class_name,
                confidence = prediction.confidence,
                duration_ms = elapsed.as_millis() as u64,
                "Prediction served"
            );
            Ok(Json(prediction))
        }
        Err(e) => {
            metrics::record_prediction_failure(&model, e.kind());
            warn!(model = %model, kind = e.kind(), "Prediction failed: {}", e);
            Err(e.into())
        }
    }
}

/// Pull the `file` field out of the form and check it is an image.
///
/// The content type is checked before the body is read, so non-image
/// uploads never reach the model.
async fn read_image_field(mut multipart: Multipart) -> ApiResult<Bytes> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::bad_request("File must be an image"));
        }

        return field.bytes().await.map_err(multipart_error);
    }

    Err(ApiError::bad_request(format!(
        "Missing multipart field '{FILE_FIELD}'"
    )))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::bad_request(e.body_text())
    }
}
