//! Narration lexicon: object label to safety sentence.
//!
//! The lexicon is built once when a process starts and then shared
//! read-only (typically behind an `Arc`). It is never mutated afterwards.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ModelError, ModelResult};
use crate::labels::normalize_label;

const BUILTIN_ENTRIES: &[(&str, &str)] = &[
    ("person", "There is a person ahead. Please stay alert."),
    ("bicycle", "There is a bicycle nearby. Be careful and give way."),
    ("car", "There are cars coming on the road. Do not cross the road now."),
    ("motorcycle", "There are motorcycles nearby. Stay cautious."),
    ("bus", "There is a bus approaching. Please wait safely."),
    ("truck", "There is a truck nearby. Keep a safe distance."),
    ("traffic light", "There is a traffic light ahead. Wait for the green signal before crossing."),
    ("stop sign", "There is a stop sign ahead. Please stop and look around before moving."),
    ("crosswalk", "There is a zebra crossing in front of you. You can cross the road safely here."),
    ("fire hydrant", "There is a fire hydrant nearby. Watch your step."),
    ("bench", "There is a bench nearby. You may sit if needed."),
    ("parking meter", "There is a parking meter close by."),
    ("bird", "There are birds ahead. Stay calm and keep safe."),
    ("cat", "There is a cat nearby. Please avoid sudden movements."),
    ("dog", "There is a dog nearby. Be cautious and quiet."),
    ("traffic cone", "There is a traffic cone ahead. Take extra caution."),
    ("construction barrier", "There is a construction barrier nearby. Avoid this area."),
    ("fire extinguisher", "There is a fire extinguisher close by."),
    ("mailbox", "There is a mailbox nearby."),
    ("potted plant", "There is a potted plant near you. Watch your path."),
    ("sidewalk", "You are near the sidewalk. Stay on it for safety."),
    ("crosswalk signal", "There is a crosswalk signal ahead. Follow its directions."),
    ("road work sign", "There is a road work sign nearby. Be very cautious."),
    ("barrier", "There is a barrier ahead. Please avoid walking into it."),
    ("wheelchair", "There is a wheelchair nearby. Give way and be respectful."),
    ("stroller", "There is a stroller nearby. Be careful around it."),
    ("traffic sign", "There is a traffic sign nearby. Follow the traffic instructions."),
];

/// Immutable mapping from normalized label to narration sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationLexicon {
    entries: HashMap<String, String>,
}

impl NarrationLexicon {
    /// The built-in navigation lexicon.
    pub fn builtin() -> Self {
        let entries = BUILTIN_ENTRIES
            .iter()
            .map(|(label, sentence)| (label.to_string(), sentence.to_string()))
            .collect();
        Self { entries }
    }

    /// Build a lexicon from explicit entries. Labels are normalized; entries
    /// with empty labels or sentences are rejected.
    pub fn from_entries<I, L, S>(entries: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = (L, S)>,
        L: AsRef<str>,
        S: Into<String>,
    {
        let mut map = HashMap::new();
        for (label, sentence) in entries {
            let key = normalize_label(label.as_ref())
                .ok_or_else(|| ModelError::invalid_lexicon("empty label"))?;
            let sentence = sentence.into().trim().to_string();
            if sentence.is_empty() {
                return Err(ModelError::invalid_lexicon(format!(
                    "empty sentence for label '{}'",
                    key
                )));
            }
            map.insert(key, sentence);
        }
        Ok(Self { entries: map })
    }

    /// Overlay entries parsed from a JSON object (`{"label": "sentence"}`)
    /// on top of this lexicon. Existing labels are replaced, others added.
    pub fn with_overrides_json(self, json: &str) -> ModelResult<Self> {
        let overrides: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| ModelError::invalid_lexicon(e.to_string()))?;
        let overrides = Self::from_entries(overrides)?;

        let mut entries = self.entries;
        entries.extend(overrides.entries);
        Ok(Self { entries })
    }

    /// Load the lexicon for a process: built-in entries, optionally
    /// overlaid by the JSON file at `path`.
    pub fn load(path: Option<&Path>) -> ModelResult<Self> {
        let base = Self::builtin();
        match path {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                base.with_overrides_json(&json)
            }
            None => Ok(base),
        }
    }

    /// Sentence for a label, if known. The label is normalized first.
    pub fn sentence(&self, label: &str) -> Option<&str> {
        let key = normalize_label(label)?;
        self.entries.get(&key).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.sentence(label).is_some()
    }

    /// All known labels, in no particular order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NarrationLexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_table() {
        let lexicon = NarrationLexicon::builtin();
        assert_eq!(lexicon.len(), 27);
        assert_eq!(
            lexicon.sentence("car"),
            Some("There are cars coming on the road. Do not cross the road now.")
        );
        assert!(lexicon.contains("traffic light"));
        assert!(!lexicon.contains("spaceship"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let lexicon = NarrationLexicon::builtin();
        assert_eq!(lexicon.sentence("PERSON"), lexicon.sentence("person"));
        assert_eq!(lexicon.sentence("Stop_Sign"), lexicon.sentence("stop sign"));
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let lexicon = NarrationLexicon::builtin()
            .with_overrides_json(r#"{"Dog": "A dog is close.", "scooter": "A scooter is passing."}"#)
            .unwrap();
        assert_eq!(lexicon.len(), 28);
        assert_eq!(lexicon.sentence("dog"), Some("A dog is close."));
        assert_eq!(lexicon.sentence("scooter"), Some("A scooter is passing."));
    }

    #[test]
    fn test_overrides_reject_empty_sentence() {
        let result = NarrationLexicon::builtin().with_overrides_json(r#"{"dog": "  "}"#);
        assert!(matches!(result, Err(ModelError::InvalidLexicon(_))));
    }

    #[test]
    fn test_overrides_reject_non_object() {
        let result = NarrationLexicon::builtin().with_overrides_json(r#"["dog"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tram": "There is a tram nearby."}}"#).unwrap();

        let lexicon = NarrationLexicon::load(Some(file.path())).unwrap();
        assert_eq!(lexicon.sentence("tram"), Some("There is a tram nearby."));
        assert!(lexicon.contains("person"));

        assert_eq!(NarrationLexicon::load(None).unwrap(), NarrationLexicon::builtin());
    }
}
