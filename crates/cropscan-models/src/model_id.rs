//! Model identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a served classifier, used as the `/predict/{model}` path segment.
///
/// Identifiers are lowercase ASCII letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(String);

impl ModelId {
    /// Leaf (potato/tomato) disease classifier.
    pub const LEAF: &'static str = "leaf";
    /// Rice disease classifier.
    pub const RICE: &'static str = "rice";

    /// Create a model identifier, normalizing to lowercase.
    pub fn new(s: impl AsRef<str>) -> Result<Self, ModelIdError> {
        let normalized = s.as_ref().trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(ModelIdError::Empty);
        }
        if let Some(c) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ModelIdError::InvalidChar(normalized.clone(), c));
        }
        Ok(Self(normalized))
    }

    /// The leaf model identifier.
    pub fn leaf() -> Self {
        Self(Self::LEAF.to_string())
    }

    /// The rice model identifier.
    pub fn rice() -> Self {
        Self(Self::RICE.to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used for per-model environment variables (`leaf` -> `LEAF`).
    pub fn env_prefix(&self) -> String {
        self.0.to_ascii_uppercase().replace('-', "_")
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModelId {
    type Err = ModelIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModelId {
    type Error = ModelIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0
    }
}

/// Error returned when parsing an invalid model identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelIdError {
    #[error("Model identifier must not be empty")]
    Empty,

    #[error("Invalid character {1:?} in model identifier {0:?}")]
    InvalidChar(String, char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_parse() {
        assert_eq!("leaf".parse::<ModelId>().unwrap(), ModelId::leaf());
        assert_eq!(" Rice ".parse::<ModelId>().unwrap(), ModelId::rice());
        assert_eq!("wheat-v2".parse::<ModelId>().unwrap().as_str(), "wheat-v2");
        assert_eq!("".parse::<ModelId>(), Err(ModelIdError::Empty));
        assert!("../etc".parse::<ModelId>().is_err());
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ModelId::leaf().env_prefix(), "LEAF");
        assert_eq!("wheat-v2".parse::<ModelId>().unwrap().env_prefix(), "WHEAT_V2");
    }

    #[test]
    fn test_serde_validates() {
        let id: ModelId = serde_json::from_str("\"rice\"").unwrap();
        assert_eq!(id, ModelId::rice());
        assert!(serde_json::from_str::<ModelId>("\"bad id\"").is_err());
        assert_eq!(serde_json::to_string(&ModelId::leaf()).unwrap(), "\"leaf\"");
    }
}
