//! Ordered class-label tables.
//!
//! Output index `i` of a classifier corresponds to entry `i` of its class list.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Deref;
use thiserror::Error;

/// Class names of the potato/tomato leaf disease classifier.
pub const LEAF_CLASS_NAMES: &[&str] = &[
    "Potato Early Blight",
    "Potato Healthy",
    "Potato Late Blight",
    "Tomato Bacterial Spot",
    "Tomato Early Blight",
    "Tomato Healthy",
    "Tomato Late Blight",
    "Tomato Leaf Mold",
    "Tomato Mosaic Virus",
    "Tomato Septoria Leaf Spot",
    "Tomato Spider Mites Two Spotted Spider Mite",
    "Tomato Target Spot",
    "Tomato Yellow Leaf Curl Virus",
];

/// Class names of the rice disease classifier.
pub const RICE_CLASS_NAMES: &[&str] = &[
    "Bacterial Leaf Blight",
    "Bacterial Streak",
    "Bakanae",
    "Brown Spot",
    "False Smut",
    "Grassy Stunt Virus",
    "Healthy Leaf",
    "Hispa",
    "Insect Affected",
    "Leaf Blast",
    "Leaf Scald",
    "Leaf Smut",
    "Narrow Brown Spot",
    "Neck Blast",
    "Ragged Stunt Virus",
    "Sheath Blight",
    "Sheath Rot",
    "Stem Rot",
    "Tungro",
];

/// Non-empty, duplicate-free, ordered list of class names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ClassList(Vec<String>);

impl ClassList {
    /// Build a class list, rejecting empty lists, blank names and duplicates.
    pub fn new(names: Vec<String>) -> Result<Self, ClassListError> {
        if names.is_empty() {
            return Err(ClassListError::Empty);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err(ClassListError::BlankName);
            }
            if !seen.insert(name.as_str()) {
                return Err(ClassListError::Duplicate(name.clone()));
            }
        }
        Ok(Self(names))
    }

    /// Built-in leaf table.
    pub fn leaf() -> Self {
        Self(LEAF_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }

    /// Built-in rice table.
    pub fn rice() -> Self {
        Self(RICE_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }

    /// Parse a labels file: one class per line, blank lines and `#` comments skipped.
    pub fn parse_labels(contents: &str) -> Result<Self, ClassListError> {
        let names = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self::new(names)
    }

    /// Class name at output index `idx`.
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Deref for ClassList {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Vec<String>> for ClassList {
    type Error = ClassListError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<ClassList> for Vec<String> {
    fn from(list: ClassList) -> Self {
        list.0
    }
}

/// Error returned when a class list is malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassListError {
    #[error("Class list must contain at least one class")]
    Empty,

    #[error("Class list contains a blank class name")]
    BlankName,

    #[error("Duplicate class name: {0}")]
    Duplicate(String),
}
