//! ONNX Runtime-backed classifier.
//!
//! Checkpoints are ONNX exports of the trained classification networks with a
//! single `[1, 3, H, W]` float input and a `[1, num_classes]` logits output.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::device::Device;
use crate::error::{InferenceError, InferenceResult};
use crate::preprocess::ImageTensor;

/// Session construction options.
#[derive(Debug, Clone, Default)]
pub struct OrtOptions {
    /// Resolved device (`Auto` is treated as CPU).
    pub device: Device,
    /// Intra-op thread count; ORT default when `None`.
    pub intra_threads: Option<usize>,
}

/// ONNX Runtime wrapper for an image classification network.
pub struct OrtClassifier {
    // ORT requires exclusive access for `run`; held only for the forward pass.
    session: Mutex<Session>,
    output_name: String,
}

/// Lock a session, recovering from poisoning.
///
/// A panic during an earlier run leaves the session itself intact.
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn load_error(path: &Path, stage: &str, e: impl fmt::Display) -> InferenceError {
    InferenceError::model_load(path, format!("{stage}: {e}"))
}

impl OrtClassifier {
    /// Load a checkpoint from disk.
    pub fn load(model_path: &Path, options: &OrtOptions) -> InferenceResult<Self> {
        if !model_path.exists() {
            return Err(InferenceError::model_load(
                model_path,
                "checkpoint file not found",
            ));
        }

        let mut builder = Session::builder()
            .map_err(|e| load_error(model_path, "ORT session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(model_path, "ORT opt level", e))?;

        if let Some(threads) = options.intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(|e| load_error(model_path, "ORT intra threads", e))?;
        }

        #[cfg(feature = "cuda")]
        if options.device == Device::Cuda {
            use ort::execution_providers::CUDAExecutionProvider;

            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| load_error(model_path, "ORT CUDA provider", e))?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| load_error(model_path, "ORT load model", e))?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| InferenceError::model_load(model_path, "model declares no outputs"))?;

        info!(
            path = %model_path.display(),
            output = %output_name,
            device = %options.device,
            "Loaded ONNX classifier"
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
        })
    }
}

impl Classifier for OrtClassifier {
    fn classify(&self, input: ImageTensor) -> InferenceResult<Vec<f32>> {
        let (shape, data) = input.into_raw();
        let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| InferenceError::inference(format!("ORT tensor: {e}")))?;

        let mut session = lock_session(&self.session);

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| InferenceError::inference(format!("ORT run failed: {e}")))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| InferenceError::inference("ORT returned no outputs"))?;

        let (shape, logits) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::inference(format!("ORT extract: {e}")))?;

        // Accept [1, C] or [C].
        let batch = if shape.len() == 2 { shape[0] } else { 1 };
        if shape.len() > 2 || batch != 1 {
            return Err(InferenceError::inference(format!(
                "Unexpected classifier output shape: {:?}",
                shape
            )));
        }

        debug!(classes = logits.len(), "Forward pass complete");
        Ok(logits.to_vec())
    }

    fn backend(&self) -> &'static str {
        "onnxruntime"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_checkpoint_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.onnx");
        let err = OrtClassifier::load(&path, &OrtOptions::default())
            .err()
            .expect("loading a missing file must fail");
        match err {
            InferenceError::ModelLoad { path: p, message } => {
                assert_eq!(p, path);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_poisoned_session_lock_recovers() {
        let session = std::sync::Arc::new(Mutex::new(7u32));
        let poisoner = std::sync::Arc::clone(&session);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("forward pass panicked");
        })
        .join();

        assert!(session.is_poisoned());
        assert_eq!(*lock_session(&session), 7);
    }
}
