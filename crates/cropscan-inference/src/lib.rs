//! Inference engine for the CropScan service.
//!
//! This crate provides:
//! - Image decoding and tensor preprocessing
//! - A `Classifier` trait with an ONNX Runtime implementation
//! - Softmax/argmax prediction over a model's class list
//! - An immutable registry of the models loaded at startup

pub mod classifier;
pub mod device;
pub mod error;
pub mod onnx;
pub mod predictor;
pub mod preprocess;
pub mod registry;

pub use classifier::Classifier;
pub use device::Device;
pub use error::{InferenceError, InferenceResult};
pub use onnx::{OrtClassifier, OrtOptions};
pub use predictor::{argmax, build_prediction, softmax, Predictor};
pub use preprocess::{ImageTensor, PreprocessConfig, Preprocessor};
pub use registry::{LoadOptions, ModelEntry, ModelRegistry, ModelSpec, ModelState};
