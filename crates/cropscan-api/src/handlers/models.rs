//! Model listing handler.

use axum::extract::State;
use axum::Json;
use cropscan_inference::Device;
use serde::Serialize;

use crate::state::AppState;

/// One registered model as reported by `GET /models`.
#[derive(Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub classes: Vec<String>,
    pub num_classes: usize,
    pub available: bool,
    pub default: bool,
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// List registered models, including unavailable ones.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let default_id = state.registry.default_model().map(|e| e.id().clone());

    let models = state
        .registry
        .entries()
        .map(|entry| {
            let classes = entry
                .classes()
                .map(|c| c.as_slice().to_vec())
                .unwrap_or_default();
            ModelInfo {
                id: entry.id().to_string(),
                num_classes: classes.len(),
                classes,
                available: entry.is_available(),
                default: default_id.as_ref() == Some(entry.id()),
                device: entry.device(),
                backend: entry.backend(),
                checkpoint: entry.checkpoint().map(|p| p.display().to_string()),
                error: entry.unavailable_reason().map(str::to_string),
            }
        })
        .collect();

    Json(ModelsResponse { models })
}
