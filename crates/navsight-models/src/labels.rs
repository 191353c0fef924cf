//! Object label normalization and the deduplicated detection set.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::frame::Detection;

/// Normalize a raw object label.
///
/// Trims, lowercases, maps `_` and `-` to spaces and collapses runs of
/// whitespace. Returns `None` for labels that are empty after normalization.
pub fn normalize_label(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    let normalized = cleaned
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Set of detected object labels, kept in first-seen order.
///
/// Every label is normalized on insertion, so the set never holds
/// case-variant duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DetectedObjects(Vec<String>);

impl DetectedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a label. Returns `true` if it was not already present.
    pub fn insert(&mut self, raw: &str) -> bool {
        match normalize_label(raw) {
            Some(label) if !self.0.contains(&label) => {
                self.0.push(label);
                true
            }
            _ => false,
        }
    }

    /// Collapse detections from many frames into one set.
    pub fn from_detections<'a>(detections: impl IntoIterator<Item = &'a Detection>) -> Self {
        detections
            .into_iter()
            .map(|d| d.label.as_str())
            .collect()
    }

    pub fn contains(&self, raw: &str) -> bool {
        normalize_label(raw).is_some_and(|label| self.0.contains(&label))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> FromIterator<&'a str> for DetectedObjects {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        for label in iter {
            set.insert(label);
        }
        set
    }
}

impl<'a> Extend<&'a str> for DetectedObjects {
    fn extend<I: IntoIterator<Item = &'a str>>(&mut self, iter: I) {
        for label in iter {
            self.insert(label);
        }
    }
}

impl From<Vec<String>> for DetectedObjects {
    fn from(labels: Vec<String>) -> Self {
        labels.iter().map(String::as_str).collect()
    }
}
