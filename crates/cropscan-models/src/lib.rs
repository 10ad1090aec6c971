//! Shared data models for the CropScan inference service.
//!
//! This crate provides Serde-serializable types for:
//! - Model identifiers
//! - Ordered class-label tables (built-in leaf and rice tables)
//! - Prediction responses

pub mod class_list;
pub mod model_id;
pub mod prediction;

// Re-export common types
pub use class_list::{ClassList, ClassListError, LEAF_CLASS_NAMES, RICE_CLASS_NAMES};
pub use model_id::{ModelId, ModelIdError};
pub use prediction::{ClassProbabilities, ClassProbability, Prediction};
