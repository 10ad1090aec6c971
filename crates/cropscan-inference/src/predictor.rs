//! Softmax/argmax prediction over a model's class list.

use cropscan_models::{ClassList, ClassProbabilities, Prediction};
use tracing::debug;

use crate::error::{InferenceError, InferenceResult};
use crate::preprocess::{PreprocessConfig, Preprocessor};
use crate::registry::{ModelEntry, ModelState};

/// Numerically stable softmax.
///
/// Fails on empty input or non-finite logits.
pub fn softmax(logits: &[f32]) -> InferenceResult<Vec<f32>> {
    if logits.is_empty() {
        return Err(InferenceError::inference("classifier returned no logits"));
    }
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::inference("classifier returned non-finite logits"));
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Index and value of the largest probability.
///
/// When several entries share the maximum, the earliest index wins, so ties
/// resolve to the first class in class-list order.
pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &p) in probabilities.iter().enumerate() {
        match best {
            Some((_, current)) if p <= current => {}
            _ => best = Some((idx, p)),
        }
    }
    best
}

/// Build the response for a set of logits.
pub fn build_prediction(classes: &ClassList, logits: &[f32]) -> InferenceResult<Prediction> {
    if logits.len() != classes.len() {
        return Err(InferenceError::inference(format!(
            "classifier returned {} logits for {} classes",
            logits.len(),
            classes.len()
        )));
    }

    let probabilities = softmax(logits)?;
    let (idx, confidence) = argmax(&probabilities)
        .ok_or_else(|| InferenceError::inference("empty probability distribution"))?;
    let class_name = classes
        .name(idx)
        .ok_or_else(|| InferenceError::inference(format!("class index {idx} out of range")))?
        .to_string();

    Ok(Prediction {
        class_name,
        confidence,
        probabilities: ClassProbabilities::from_parts(classes.iter(), &probabilities),
    })
}

/// Runs the full request pipeline: decode, preprocess, forward pass, softmax.
#[derive(Debug, Clone, Default)]
pub struct Predictor {
    preprocessor: Preprocessor,
}

impl Predictor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            preprocessor: Preprocessor::new(config),
        }
    }

    /// Classify one encoded image with the given model.
    ///
    /// Blocking: decoding and the forward pass run on the calling thread.
    pub fn predict(&self, entry: &ModelEntry, image_bytes: &[u8]) -> InferenceResult<Prediction> {
        let (classifier, classes) = match entry.state() {
            ModelState::Ready {
                classifier,
                classes,
            } => (classifier, classes),
            ModelState::Unavailable { reason, .. } => {
                return Err(InferenceError::unavailable(entry.id().as_str(), reason.clone()));
            }
        };

        let input = self.preprocessor.preprocess(image_bytes)?;
        let logits = classifier.classify(input)?;
        let prediction = build_prediction(classes, &logits)?;

        debug!(
            model = %entry.id(),
            class_name = %prediction.class_name,
            confidence = prediction.confidence,
            "Prediction complete"
        );

        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::preprocess::ImageTensor;
    use cropscan_models::ModelId;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedLogits {
        logits: Vec<f32>,
        calls: AtomicUsize,
    }

    impl Classifier for FixedLogits {
        fn classify(&self, input: ImageTensor) -> InferenceResult<Vec<f32>> {
            assert_eq!(input.shape(), [1, 3, 16, 16]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.logits.clone())
        }

        fn backend(&self) -> &'static str {
            "fixed"
        }
    }

    fn png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([40, 180, 60])))
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn predictor() -> Predictor {
        Predictor::new(PreprocessConfig {
            image_size: 16,
            ..Default::default()
        })
    }

    fn classes() -> ClassList {
        ClassList::new(vec!["Healthy".into(), "Blast".into(), "Smut".into()]).unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[2.0, -1.0, 0.5, 10.0]).unwrap();
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(probs.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn test_softmax_large_logits_are_stable() {
        let probs = softmax(&[1000.0, 1000.0]).unwrap();
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!(softmax(&[f32::NAN, 1.0]).is_err());
        assert!(softmax(&[]).is_err());
    }

    #[test]
    fn test_argmax_ties_pick_first_class() {
        assert_eq!(argmax(&[0.1, 0.45, 0.45]), Some((1, 0.45)));
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), Some((0, 0.25)));
        assert_eq!(argmax(&[]), None);

        // Equal logits give exactly equal probabilities.
        let prediction = build_prediction(&classes(), &[0.0, 3.0, 3.0]).unwrap();
        assert_eq!(prediction.class_name, "Blast");
    }

    #[test]
    fn test_build_prediction_contract() {
        let prediction = build_prediction(&classes(), &[0.3, 1.2, -0.4]).unwrap();
        assert_eq!(prediction.class_name, "Blast");
        assert_eq!(prediction.probabilities.len(), 3);
        assert!((prediction.probabilities.total() - 1.0).abs() < 1e-4);

        let max = prediction
            .probabilities
            .iter()
            .map(|p| p.probability)
            .fold(f32::MIN, f32::max);
        assert_eq!(prediction.confidence, max);
        assert_eq!(prediction.probabilities.get("Blast"), Some(max));
    }

    #[test]
    fn test_logit_count_mismatch_is_inference_error() {
        let err = build_prediction(&classes(), &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, InferenceError::Inference(_)));
    }

    #[test]
    fn test_predict_runs_classifier() {
        let classifier = Arc::new(FixedLogits {
            logits: vec![0.0, 0.0, 4.0],
            calls: AtomicUsize::new(0),
        });
        let entry = ModelEntry::ready(ModelId::rice(), classes(), classifier.clone());

        let prediction = predictor().predict(&entry, &png()).unwrap();
        assert_eq!(prediction.class_name, "Smut");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_image_skips_classifier() {
        let classifier = Arc::new(FixedLogits {
            logits: vec![0.0, 0.0, 4.0],
            calls: AtomicUsize::new(0),
        });
        let entry = ModelEntry::ready(ModelId::rice(), classes(), classifier.clone());

        let err = predictor().predict(&entry, b"GIF89a-not-really").unwrap_err();
        assert!(matches!(err, InferenceError::InvalidImage(_)));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unavailable_model_fails_before_decoding() {
        let entry = ModelEntry::unavailable(
            ModelId::leaf(),
            Some(classes()),
            "checkpoint not found at effnet_model/leaf_b4.onnx",
        );
        let err = predictor().predict(&entry, &png()).unwrap_err();
        match err {
            InferenceError::ModelUnavailable { model, reason } => {
                assert_eq!(model, "leaf");
                assert!(reason.contains("checkpoint not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
