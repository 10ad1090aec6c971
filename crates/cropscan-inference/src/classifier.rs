//! Classifier abstraction.

use crate::error::InferenceResult;
use crate::preprocess::ImageTensor;

/// A loaded network producing one raw logit per class.
///
/// Implementations must be safe to share across request tasks.
pub trait Classifier: Send + Sync {
    /// Run one forward pass and return the raw (pre-softmax) logits.
    fn classify(&self, input: ImageTensor) -> InferenceResult<Vec<f32>>;

    /// Short backend name for logs and the model listing.
    fn backend(&self) -> &'static str;
}
