//! Application state.

use std::sync::Arc;
use std::time::Instant;

use cropscan_inference::{ModelRegistry, Predictor};

use crate::config::ApiConfig;

/// Shared application state.
///
/// Everything here is read-only once the server starts.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<ModelRegistry>,
    pub predictor: Arc<Predictor>,
    pub started_at: Instant,
}

impl AppState {
    /// Create state around an already-built registry.
    pub fn new(config: ApiConfig, registry: ModelRegistry) -> Self {
        let registry = match &config.default_model {
            Some(id) => registry.with_default(id.clone()),
            None => registry,
        };

        Self {
            config,
            registry: Arc::new(registry),
            predictor: Arc::new(Predictor::default()),
            started_at: Instant::now(),
        }
    }

    /// Load every configured model and create state.
    ///
    /// Blocking: reads checkpoints and builds ONNX Runtime sessions.
    pub fn load(config: ApiConfig) -> Self {
        let registry = ModelRegistry::load(&config.model_specs(), &config.load_options());
        Self::new(config, registry)
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
