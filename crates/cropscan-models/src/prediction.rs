//! Prediction response models.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Probability assigned to one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbability {
    pub class_name: String,
    pub probability: f32,
}

/// Full class -> probability distribution.
///
/// Serialized as a JSON object whose keys follow the model's class-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassProbabilities(Vec<ClassProbability>);

impl ClassProbabilities {
    /// Pair class names with probabilities by output index.
    pub fn from_parts<'a>(
        names: impl IntoIterator<Item = &'a String>,
        probabilities: &[f32],
    ) -> Self {
        Self(
            names
                .into_iter()
                .zip(probabilities)
                .map(|(name, &probability)| ClassProbability {
                    class_name: name.clone(),
                    probability,
                })
                .collect(),
        )
    }

    pub fn get(&self, class_name: &str) -> Option<f32> {
        self.0
            .iter()
            .find(|p| p.class_name == class_name)
            .map(|p| p.probability)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassProbability> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all probabilities.
    pub fn total(&self) -> f32 {
        self.0.iter().map(|p| p.probability).sum()
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for p in &self.0 {
            map.serialize_entry(&p.class_name, &p.probability)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ClassProbabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProbabilitiesVisitor;

        impl<'de> Visitor<'de> for ProbabilitiesVisitor {
            type Value = ClassProbabilities;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of class name to probability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((class_name, probability)) = access.next_entry::<String, f32>()? {
                    entries.push(ClassProbability {
                        class_name,
                        probability,
                    });
                }
                Ok(ClassProbabilities(entries))
            }
        }

        deserializer.deserialize_map(ProbabilitiesVisitor)
    }
}

impl JsonSchema for ClassProbabilities {
    fn schema_name() -> String {
        "ClassProbabilities".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <HashMap<String, f32>>::json_schema(gen)
    }
}

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Prediction {
    /// Predicted class (argmax of the distribution).
    pub class_name: String,
    /// Probability of the predicted class, in [0, 1].
    pub confidence: f32,
    /// Probability of every class of the model.
    pub probabilities: ClassProbabilities,
}
