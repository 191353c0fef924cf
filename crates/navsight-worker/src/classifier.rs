//! Per-frame object classification over the Vision Service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use navsight_ml_client::{MlError, VisionService};
use navsight_models::{DetectedObjects, Frame, NarrationLexicon};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics::{record_classification_failure, record_frame_classified};

/// Fixed instruction sent with every frame.
pub const NAVIGATION_INSTRUCTION: &str = "You are a vision assistant that helps visually impaired people navigate safely. \
Identify the objects in the image that matter for safe navigation: \
pedestrians, vehicles, traffic lights and traffic signs, obstacles, sidewalks, crosswalks, barriers, animals, \
and assistive navigation aids. \
Return ONLY a JSON array of object names in lowercase, like: [\"person\", \"car\", \"traffic light\"]";

/// Classifies frames by asking the Vision Service and parsing its reply
/// defensively.
#[derive(Clone)]
pub struct ObjectClassifier {
    vision: Arc<dyn VisionService>,
    lexicon: Arc<NarrationLexicon>,
    timeout: Duration,
}

impl ObjectClassifier {
    pub fn new(vision: Arc<dyn VisionService>, lexicon: Arc<NarrationLexicon>, timeout: Duration) -> Self {
        Self {
            vision,
            lexicon,
            timeout,
        }
    }

    /// Labels seen in one frame. A failed or timed-out call yields the
    /// empty set.
    pub async fn classify(&self, frame: &Frame) -> DetectedObjects {
        match self.try_classify(frame).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(timestamp = frame.timestamp_secs, "Frame classification absorbed: {}", e);
                DetectedObjects::new()
            }
        }
    }

    /// Like [`classify`](Self::classify) but surfaces the failure so the
    /// caller can count it.
    pub async fn try_classify(&self, frame: &Frame) -> WorkerResult<DetectedObjects> {
        let reply = match tokio::time::timeout(
            self.timeout,
            self.vision.describe(&frame.image, NAVIGATION_INSTRUCTION),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                let reason = if matches!(e, MlError::Timeout(_)) { "timeout" } else { "service" };
                record_classification_failure(reason);
                return Err(WorkerError::classification(e.to_string()));
            }
            Err(_) => {
                record_classification_failure("timeout");
                return Err(WorkerError::classification(format!(
                    "Vision Service timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        record_frame_classified();
        let labels = parse_labels(&reply, &self.lexicon);
        debug!(
            timestamp = frame.timestamp_secs,
            labels = labels.len(),
            "Classified frame"
        );
        Ok(labels)
    }
}

/// Extract labels from an untrusted Vision Service reply.
///
/// Tries, in order: the whole reply as JSON (after stripping Markdown
/// fences), the first `[...]` segment as JSON, and finally a scan for
/// lexicon phrases in the raw text. Only the scan is restricted to known
/// labels.
pub fn parse_labels(raw: &str, lexicon: &NarrationLexicon) -> DetectedObjects {
    let body = strip_code_fences(raw);

    if let Some(labels) = parse_json_labels(body) {
        return labels;
    }

    if let Some(segment) = first_bracket_segment(body) {
        if let Some(labels) = parse_json_labels(segment) {
            return labels;
        }
    }

    scan_known_phrases(raw, lexicon)
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn first_bracket_segment(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = start + text[start..].find(']')?;
    Some(&text[start..=end])
}

fn parse_json_labels(text: &str) -> Option<DetectedObjects> {
    let value: Value = serde_json::from_str(text).ok()?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("objects").or_else(|| map.get("labels")) {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let mut labels = DetectedObjects::new();
    for item in items {
        let label = match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj
                .get("name")
                .or_else(|| obj.get("label"))
                .and_then(Value::as_str),
            _ => None,
        };
        if let Some(label) = label {
            labels.insert(label);
        }
    }
    Some(labels)
}

/// A lexicon label split into words, with the plural of its last word.
struct Phrase<'a> {
    words: Vec<&'a str>,
    plural_tail: String,
}

impl<'a> Phrase<'a> {
    fn new(label: &'a str) -> Self {
        let words: Vec<&str> = label.split(' ').collect();
        let plural_tail = words.last().map(|w| plural(w)).unwrap_or_default();
        Self { words, plural_tail }
    }

    /// Exact words, except that the last may be in its plural form.
    fn matches_at(&self, text: &[&str]) -> bool {
        let last = self.words.len() - 1;
        text.len() >= self.words.len()
            && self
                .words
                .iter()
                .zip(text)
                .enumerate()
                .all(|(i, (want, got))| got == want || (i == last && *got == self.plural_tail))
    }
}

/// Find lexicon labels in free text, longest phrase first at each position.
fn scan_known_phrases(raw: &str, lexicon: &NarrationLexicon) -> DetectedObjects {
    let lowered = raw.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut phrases: Vec<Phrase> = lexicon
        .labels()
        .filter(|label| !label.is_empty())
        .map(Phrase::new)
        .collect();
    phrases.sort_by(|a, b| b.words.len().cmp(&a.words.len()));

    let mut found = DetectedObjects::new();
    let mut i = 0;
    while i < words.len() {
        match phrases.iter().find(|phrase| phrase.matches_at(&words[i..])) {
            Some(phrase) => {
                found.insert(&phrase.words.join(" "));
                i += phrase.words.len();
            }
            None => i += 1,
        }
    }
    found
}

/// Regular English plural, plus the one irregular noun the lexicon needs.
fn plural(word: &str) -> String {
    if word == "person" {
        return "people".to_string();
    }
    let sibilant = ["s", "x", "z", "ch", "sh"].iter().any(|end| word.ends_with(end));
    if sibilant {
        return format!("{}es", word);
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", word)
}
