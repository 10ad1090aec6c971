//! Registry of the classifiers loaded at startup.
//!
//! The registry is built once before the server accepts traffic and is
//! read-only afterwards. A model whose checkpoint is missing or invalid is
//! still registered, as unavailable, so its endpoint can report why instead
//! of the process refusing to start.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cropscan_models::{ClassList, ModelId};
use tracing::{error, info, warn};

use crate::classifier::Classifier;
use crate::device::Device;
use crate::error::{InferenceError, InferenceResult};
use crate::onnx::{OrtClassifier, OrtOptions};
use crate::preprocess::{ImageTensor, IMAGE_SIZE};

/// Configuration for one served model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub id: ModelId,
    /// ONNX checkpoint path.
    pub checkpoint: PathBuf,
    /// Optional labels file overriding the built-in class table.
    pub labels: Option<PathBuf>,
}

impl ModelSpec {
    pub fn new(id: ModelId, checkpoint: impl Into<PathBuf>) -> Self {
        Self {
            id,
            checkpoint: checkpoint.into(),
            labels: None,
        }
    }

    pub fn with_labels(mut self, labels: impl Into<PathBuf>) -> Self {
        self.labels = Some(labels.into());
        self
    }

    /// Resolve the ordered class list: labels file first, then the built-in table.
    pub fn class_list(&self) -> InferenceResult<ClassList> {
        if let Some(path) = &self.labels {
            let contents = std::fs::read_to_string(path)?;
            return ClassList::parse_labels(&contents).map_err(|e| {
                InferenceError::unavailable(
                    self.id.as_str(),
                    format!("invalid labels file {}: {e}", path.display()),
                )
            });
        }

        match self.id.as_str() {
            ModelId::LEAF => Ok(ClassList::leaf()),
            ModelId::RICE => Ok(ClassList::rice()),
            other => Err(InferenceError::unavailable(
                other,
                "no built-in class list; set a labels file",
            )),
        }
    }
}

/// Load state of a registered model.
#[derive(Clone)]
pub enum ModelState {
    Ready {
        classifier: Arc<dyn Classifier>,
        classes: ClassList,
    },
    Unavailable {
        classes: Option<ClassList>,
        reason: String,
    },
}

/// One registered model.
#[derive(Clone)]
pub struct ModelEntry {
    id: ModelId,
    checkpoint: Option<PathBuf>,
    device: Device,
    state: ModelState,
}

impl ModelEntry {
    /// Entry backed by a loaded classifier.
    pub fn ready(id: ModelId, classes: ClassList, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            id,
            checkpoint: None,
            device: Device::Cpu,
            state: ModelState::Ready {
                classifier,
                classes,
            },
        }
    }

    /// Entry whose endpoint reports `reason` instead of predicting.
    pub fn unavailable(id: ModelId, classes: Option<ClassList>, reason: impl Into<String>) -> Self {
        Self {
            id,
            checkpoint: None,
            device: Device::Cpu,
            state: ModelState::Unavailable {
                classes,
                reason: reason.into(),
            },
        }
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn classes(&self) -> Option<&ClassList> {
        match &self.state {
            ModelState::Ready { classes, .. } => Some(classes),
            ModelState::Unavailable { classes, .. } => classes.as_ref(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, ModelState::Ready { .. })
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            ModelState::Ready { .. } => None,
            ModelState::Unavailable { reason, .. } => Some(reason),
        }
    }

    pub fn backend(&self) -> Option<&'static str> {
        match &self.state {
            ModelState::Ready { classifier, .. } => Some(classifier.backend()),
            ModelState::Unavailable { .. } => None,
        }
    }
}

/// Options applied to every model loaded by [`ModelRegistry::load`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Requested device; resolved once for the whole registry.
    pub device: Device,
    pub intra_threads: Option<usize>,
    /// Input size used for the load-time check pass.
    pub image_size: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            device: Device::Auto,
            intra_threads: None,
            image_size: IMAGE_SIZE,
        }
    }
}

/// Immutable collection of models keyed by identifier.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<Arc<ModelEntry>>,
    default_model: Option<ModelId>,
}

impl ModelRegistry {
    /// Build a registry from constructed entries. The first entry is the default model.
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        let mut unique: Vec<Arc<ModelEntry>> = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(existing) = unique.iter_mut().find(|e| e.id() == entry.id()) {
                warn!(model = %entry.id(), "Duplicate model registration, keeping the last one");
                *existing = Arc::new(entry);
            } else {
                unique.push(Arc::new(entry));
            }
        }
        let default_model = unique.first().map(|e| e.id().clone());
        Self {
            entries: unique,
            default_model,
        }
    }

    /// Choose the model served by the unqualified `/predict` route.
    pub fn with_default(mut self, id: ModelId) -> Self {
        if self.get(&id).is_some() {
            self.default_model = Some(id);
        } else {
            warn!(model = %id, "Default model is not registered, keeping {:?}", self.default_model);
        }
        self
    }

    /// Load every spec with ONNX Runtime.
    pub fn load(specs: &[ModelSpec], options: &LoadOptions) -> Self {
        let device = options.device.resolve();
        info!(requested = %options.device, resolved = %device, "Selected inference device");

        let ort_options = OrtOptions {
            device,
            intra_threads: options.intra_threads,
        };

        Self::load_with(specs, device, options.image_size, |spec| {
            OrtClassifier::load(&spec.checkpoint, &ort_options)
                .map(|c| Arc::new(c) as Arc<dyn Classifier>)
        })
    }

    /// Load every spec with a custom classifier constructor.
    ///
    /// Each loaded network is run once on an all-zero input to check its
    /// output dimension against the class list.
    pub fn load_with<F>(specs: &[ModelSpec], device: Device, image_size: u32, loader: F) -> Self
    where
        F: Fn(&ModelSpec) -> InferenceResult<Arc<dyn Classifier>>,
    {
        let entries = specs
            .iter()
            .map(|spec| {
                load_entry(spec, image_size, &loader)
                    .with_checkpoint(&spec.checkpoint)
                    .with_device(device)
            })
            .collect();
        let registry = Self::new(entries);

        info!(
            total = registry.len(),
            available = registry.available_count(),
            "Model registry ready"
        );
        registry
    }

    pub fn get(&self, id: &ModelId) -> Option<&Arc<ModelEntry>> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Look up by raw path segment.
    pub fn get_str(&self, id: &str) -> Option<&Arc<ModelEntry>> {
        let id = id.parse::<ModelId>().ok()?;
        self.get(&id)
    }

    pub fn default_model(&self) -> Option<&Arc<ModelEntry>> {
        self.default_model.as_ref().and_then(|id| self.get(id))
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<ModelEntry>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_available()).count()
    }
}

fn load_entry<F>(spec: &ModelSpec, image_size: u32, loader: &F) -> ModelEntry
where
    F: Fn(&ModelSpec) -> InferenceResult<Arc<dyn Classifier>>,
{
    let classes = match spec.class_list() {
        Ok(classes) => classes,
        Err(e) => {
            error!(model = %spec.id, "Failed to resolve class list: {}", e);
            return ModelEntry::unavailable(spec.id.clone(), None, e.to_string());
        }
    };

    if !spec.checkpoint.exists() {
        error!(
            model = %spec.id,
            path = %spec.checkpoint.display(),
            "Model file not found; endpoint will report the model as unavailable"
        );
        return ModelEntry::unavailable(
            spec.id.clone(),
            Some(classes),
            format!("checkpoint not found at {}", spec.checkpoint.display()),
        );
    }

    let classifier = match loader(spec) {
        Ok(classifier) => classifier,
        Err(e) => {
            error!(model = %spec.id, "Failed to load model: {}", e);
            return ModelEntry::unavailable(spec.id.clone(), Some(classes), e.to_string());
        }
    };

    let outputs = match classifier.classify(ImageTensor::zeros(image_size)) {
        Ok(logits) => logits.len(),
        Err(e) => {
            error!(model = %spec.id, "Model check pass failed: {}", e);
            return ModelEntry::unavailable(spec.id.clone(), Some(classes), e.to_string());
        }
    };

    if outputs != classes.len() {
        let e = InferenceError::ClassCountMismatch {
            model: spec.id.to_string(),
            expected: classes.len(),
            actual: outputs,
        };
        error!(model = %spec.id, "{}", e);
        return ModelEntry::unavailable(spec.id.clone(), Some(classes), e.to_string());
    }

    info!(
        model = %spec.id,
        path = %spec.checkpoint.display(),
        classes = classes.len(),
        backend = classifier.backend(),
        "Model loaded"
    );
    ModelEntry::ready(spec.id.clone(), classes, classifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct ConstantClassifier(usize);

    impl Classifier for ConstantClassifier {
        fn classify(&self, _input: ImageTensor) -> InferenceResult<Vec<f32>> {
            Ok(vec![0.0; self.0])
        }

        fn backend(&self) -> &'static str {
            "constant"
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path).unwrap();
        path
    }

    #[test]
    fn test_missing_checkpoint_registers_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![
            ModelSpec::new(ModelId::leaf(), touch(dir.path(), "leaf.onnx")),
            ModelSpec::new(ModelId::rice(), dir.path().join("missing.onnx")),
        ];

        let registry = ModelRegistry::load_with(&specs, Device::Cpu, 8, |spec| {
            Ok(Arc::new(ConstantClassifier(spec.class_list()?.len())) as Arc<dyn Classifier>)
        });

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.available_count(), 1);
        assert!(registry.get(&ModelId::leaf()).unwrap().is_available());

        let rice = registry.get(&ModelId::rice()).unwrap();
        assert!(!rice.is_available());
        assert!(rice.unavailable_reason().unwrap().contains("checkpoint not found"));
        // Class table is still known for listing.
        assert_eq!(rice.classes().unwrap().len(), 19);
    }

    #[test]
    fn test_class_count_mismatch_registers_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![ModelSpec::new(ModelId::leaf(), touch(dir.path(), "leaf.onnx"))];

        let registry = ModelRegistry::load_with(&specs, Device::Cpu, 8, |_| {
            Ok(Arc::new(ConstantClassifier(1000)) as Arc<dyn Classifier>)
        });

        let leaf = registry.get(&ModelId::leaf()).unwrap();
        assert!(!leaf.is_available());
        assert!(leaf.unavailable_reason().unwrap().contains("outputs 1000"));
    }

    #[test]
    fn test_loader_error_registers_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![ModelSpec::new(ModelId::rice(), touch(dir.path(), "rice.onnx"))];

        let registry = ModelRegistry::load_with(&specs, Device::Cpu, 8, |spec| {
            Err(InferenceError::model_load(&spec.checkpoint, "protobuf parsing failed"))
        });

        let rice = registry.get(&ModelId::rice()).unwrap();
        assert!(rice.unavailable_reason().unwrap().contains("protobuf parsing failed"));
    }

    #[test]
    fn test_labels_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let labels = dir.path().join("wheat.txt");
        let mut f = std::fs::File::create(&labels).unwrap();
        writeln!(f, "Healthy\nStem Rust\nLeaf Rust").unwrap();

        let wheat: ModelId = "wheat".parse().unwrap();
        let spec =
            ModelSpec::new(wheat.clone(), touch(dir.path(), "wheat.onnx")).with_labels(&labels);
        assert_eq!(spec.class_list().unwrap().len(), 3);

        // Unknown model without labels has no class list.
        let bare = ModelSpec::new(wheat, dir.path().join("wheat.onnx"));
        assert!(bare.class_list().is_err());
    }

    #[test]
    fn test_default_model_and_lookup() {
        let entries = vec![
            ModelEntry::ready(ModelId::leaf(), ClassList::leaf(), Arc::new(ConstantClassifier(13))),
            ModelEntry::ready(ModelId::rice(), ClassList::rice(), Arc::new(ConstantClassifier(19))),
        ];
        let registry = ModelRegistry::new(entries);
        assert_eq!(registry.default_model().unwrap().id(), &ModelId::leaf());

        let registry = registry.with_default(ModelId::rice());
        assert_eq!(registry.default_model().unwrap().id(), &ModelId::rice());
        assert!(registry.get_str("RICE").is_some());
        assert!(registry.get_str("corn").is_none());
        assert!(registry.get_str("../x").is_none());

        let registry = registry.with_default("corn".parse().unwrap());
        assert_eq!(registry.default_model().unwrap().id(), &ModelId::rice());
    }
}
