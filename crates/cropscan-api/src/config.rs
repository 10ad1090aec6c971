//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use cropscan_inference::{Device, LoadOptions, ModelSpec, PreprocessConfig};
use cropscan_models::ModelId;
use tracing::warn;

/// Directory holding the exported checkpoints by default.
const DEFAULT_MODEL_DIR: &str = "effnet_model";

/// Configuration for one served model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub id: ModelId,
    /// ONNX checkpoint path
    pub checkpoint: PathBuf,
    /// Optional labels file (one class per line)
    pub labels: Option<PathBuf>,
}

impl ModelConfig {
    /// Default checkpoint location for a model.
    pub fn default_checkpoint(id: &ModelId) -> PathBuf {
        let file = match id.as_str() {
            ModelId::LEAF => "leaf_b4.onnx".to_string(),
            ModelId::RICE => "rice_b4.onnx".to_string(),
            other => format!("{other}.onnx"),
        };
        PathBuf::from(DEFAULT_MODEL_DIR).join(file)
    }

    pub fn new(id: ModelId) -> Self {
        Self {
            checkpoint: Self::default_checkpoint(&id),
            id,
            labels: None,
        }
    }

    pub fn to_spec(&self) -> ModelSpec {
        let spec = ModelSpec::new(self.id.clone(), &self.checkpoint);
        match &self.labels {
            Some(labels) => spec.with_labels(labels),
            None => spec,
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Name reported by the root route
    pub service_name: String,
    /// Models to serve, in registration order
    pub models: Vec<ModelConfig>,
    /// Model behind `POST /predict` (first model when unset)
    pub default_model: Option<ModelId>,
    /// Requested compute device
    pub device: Device,
    /// ONNX Runtime intra-op threads
    pub intra_threads: Option<usize>,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP predict rate limit, 0 disables
    pub rate_limit_rps: u32,
    /// Key rate limits on `X-Forwarded-For`/`X-Real-IP` (only behind a proxy)
    pub trust_proxy_headers: bool,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8029,
            service_name: "EfficientNet Disease Classification API".to_string(),
            models: vec![ModelConfig::new(ModelId::leaf()), ModelConfig::new(ModelId::rice())],
            default_model: None,
            device: Device::Auto,
            intra_threads: None,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 0,
            trust_proxy_headers: false,
            request_timeout: Duration::from_secs(60),
            max_body_size: 20 * 1024 * 1024, // 20MB
            metrics_enabled: true,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |key: &str| lookup(key).map(|v| v == "true" || v == "1");

        let models = match lookup("ENABLED_MODELS") {
            Some(list) => parse_model_list(&list),
            None => vec![ModelId::leaf(), ModelId::rice()],
        }
        .into_iter()
        .map(|id| {
            let prefix = id.env_prefix();
            let mut model = ModelConfig::new(id);
            if let Some(path) = lookup(&format!("{prefix}_MODEL_PATH")) {
                model.checkpoint = PathBuf::from(path);
            }
            model.labels = lookup(&format!("{prefix}_LABELS_PATH")).map(PathBuf::from);
            model
        })
        .collect::<Vec<_>>();

        let default_model = lookup("DEFAULT_MODEL").and_then(|s| match s.parse::<ModelId>() {
            Ok(id) if models.iter().any(|m| m.id == id) => Some(id),
            Ok(id) => {
                warn!(model = %id, "DEFAULT_MODEL is not in ENABLED_MODELS, ignoring");
                None
            }
            Err(e) => {
                warn!("Invalid DEFAULT_MODEL: {}", e);
                None
            }
        });

        let device = lookup("INFERENCE_DEVICE")
            .map(|s| {
                s.parse().unwrap_or_else(|e| {
                    warn!("{}, using auto", e);
                    Device::Auto
                })
            })
            .unwrap_or(defaults.device);

        Self {
            host: lookup("API_HOST").unwrap_or(defaults.host),
            port: ["PORT", "API_PORT"]
                .into_iter()
                .find_map(|key| lookup(key).and_then(|s| s.trim().parse().ok()))
                .unwrap_or(defaults.port),
            service_name: lookup("SERVICE_NAME").unwrap_or(defaults.service_name),
            models,
            default_model,
            device,
            intra_threads: parsed("INTRA_OP_THREADS")
                .filter(|n| *n > 0)
                .map(|n| n as usize),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: parsed("RATE_LIMIT_RPS")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.rate_limit_rps),
            trust_proxy_headers: flag("TRUST_PROXY_HEADERS")
                .unwrap_or(defaults.trust_proxy_headers),
            request_timeout: parsed("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: parsed("MAX_BODY_SIZE")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_body_size),
            metrics_enabled: flag("METRICS_ENABLED").unwrap_or(defaults.metrics_enabled),
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Registry specs for every configured model.
    pub fn model_specs(&self) -> Vec<ModelSpec> {
        self.models.iter().map(ModelConfig::to_spec).collect()
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            device: self.device,
            intra_threads: self.intra_threads,
            image_size: PreprocessConfig::default().image_size,
        }
    }
}

/// Parse a comma separated model list, skipping invalid and repeated entries.
fn parse_model_list(list: &str) -> Vec<ModelId> {
    let mut ids: Vec<ModelId> = Vec::new();
    for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match raw.parse::<ModelId>() {
            Ok(id) if !ids.contains(&id) => ids.push(id),
            Ok(_) => {}
            Err(e) => warn!("Skipping model {:?} in ENABLED_MODELS: {}", raw, e),
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ApiConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8029);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].checkpoint, PathBuf::from("effnet_model/leaf_b4.onnx"));
        assert_eq!(config.models[1].checkpoint, PathBuf::from("effnet_model/rice_b4.onnx"));
        assert_eq!(config.device, Device::Auto);
        assert_eq!(config.rate_limit_rps, 0);
        assert!(!config.is_production());
    }

    #[test]
    fn test_model_paths_from_env() {
        let config = config_from(&[
            ("LEAF_MODEL_PATH", "/models/leaf.onnx"),
            ("RICE_MODEL_PATH", "/models/rice.onnx"),
            ("RICE_LABELS_PATH", "/models/rice.txt"),
            ("PORT", "9000"),
            ("INFERENCE_DEVICE", "cpu"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.device, Device::Cpu);
        let specs = config.model_specs();
        assert_eq!(specs[0].checkpoint, PathBuf::from("/models/leaf.onnx"));
        assert_eq!(specs[0].labels, None);
        assert_eq!(specs[1].labels, Some(PathBuf::from("/models/rice.txt")));
    }

    #[test]
    fn test_single_model_mode() {
        let config = config_from(&[("ENABLED_MODELS", "rice"), ("DEFAULT_MODEL", "leaf")]);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].id, ModelId::rice());
        // Default must be one of the served models.
        assert_eq!(config.default_model, None);

        let config = config_from(&[
            ("ENABLED_MODELS", "leaf, rice,leaf,bad id"),
            ("DEFAULT_MODEL", "rice"),
        ]);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.default_model, Some(ModelId::rice()));
    }

    #[test]
    fn test_custom_model_defaults() {
        let config = config_from(&[
            ("ENABLED_MODELS", "wheat-v2"),
            ("WHEAT_V2_LABELS_PATH", "wheat.txt"),
        ]);
        assert_eq!(config.models[0].checkpoint, PathBuf::from("effnet_model/wheat-v2.onnx"));
        assert_eq!(config.models[0].labels, Some(PathBuf::from("wheat.txt")));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("API_PORT", "8100"),
            ("INFERENCE_DEVICE", "tpu"),
            ("MAX_BODY_SIZE", "-1"),
        ]);
        assert_eq!(config.port, 8100);
        assert_eq!(config.device, Device::Auto);
        assert_eq!(config.max_body_size, 20 * 1024 * 1024);

        let config = config_from(&[("PORT", "not-a-port")]);
        assert_eq!(config.port, 8029);
    }

    #[test]
    fn test_production_and_proxy_flags() {
        let config = config_from(&[("ENVIRONMENT", "Production"), ("TRUST_PROXY_HEADERS", "1")]);
        assert!(config.is_production());
        assert!(config.trust_proxy_headers);
        assert!(!config_from(&[]).trust_proxy_headers);
    }
}
