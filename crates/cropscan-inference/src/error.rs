//! Error types for inference operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Errors that can occur while loading models or classifying images.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Model '{model}' is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    #[error("Failed to load model from {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Model '{model}' has {expected} classes configured but the network outputs {actual}")]
    ClassCountMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    /// Create an invalid image error.
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage(message.into())
    }

    /// Create a model unavailable error.
    pub fn unavailable(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create a model load failure.
    pub fn model_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an inference failure.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::InvalidImage(_) => "invalid_image",
            InferenceError::ModelUnavailable { .. } => "model_unavailable",
            InferenceError::ModelLoad { .. } => "model_load",
            InferenceError::ClassCountMismatch { .. } => "class_count_mismatch",
            InferenceError::Inference(_) => "inference",
            InferenceError::Io(_) => "io",
        }
    }
}
