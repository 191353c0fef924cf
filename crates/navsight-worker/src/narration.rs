//! Narration composition.

use navsight_models::{DetectedObjects, NarrationLexicon};

/// Narration used when no frame produced any label.
pub const NO_OBJECTS_NARRATION: &str =
    "No notable objects were detected in your surroundings. Please continue with care.";

/// Appended to the fallback listing of unknown labels.
pub const CAUTION_PHRASE: &str = "Please be careful.";

/// Most unknown labels named in the fallback listing.
pub const MAX_FALLBACK_NAMES: usize = 10;

/// Render the narration for a video's detected objects.
///
/// Known labels contribute their lexicon sentence in first-seen order. If
/// none of the labels are known, the raw names are listed with a caution
/// phrase, so the result is never empty.
pub fn compose(lexicon: &NarrationLexicon, detected: &DetectedObjects) -> String {
    if detected.is_empty() {
        return NO_OBJECTS_NARRATION.to_string();
    }

    let sentences: Vec<&str> = detected
        .iter()
        .filter_map(|label| lexicon.sentence(label))
        .collect();

    if sentences.is_empty() {
        let names: Vec<&str> = detected.iter().take(MAX_FALLBACK_NAMES).collect();
        let rest = detected.len().saturating_sub(MAX_FALLBACK_NAMES);
        let listing = match rest {
            0 => names.join(", "),
            n => format!("{} and {} more", names.join(", "), n),
        };
        return format!("Detected objects: {}. {}", listing, CAUTION_PHRASE);
    }

    sentences.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> NarrationLexicon {
        NarrationLexicon::builtin()
    }

    fn objects(labels: &[&str]) -> DetectedObjects {
        labels.iter().copied().collect()
    }

    #[test]
    fn test_case_variants_compose_identically() {
        let lex = lexicon();
        assert_eq!(
            compose(&lex, &objects(&["Car", "car"])),
            compose(&lex, &objects(&["car"]))
        );
    }

    #[test]
    fn test_empty_detections_use_distinct_narration() {
        let text = compose(&lexicon(), &DetectedObjects::new());
        assert_eq!(text, NO_OBJECTS_NARRATION);
        assert!(!text.is_empty());
    }

    #[test]
    fn test_unknown_labels_fall_back_to_listing() {
        let text = compose(&lexicon(), &objects(&["Lamp Post", "kiosk"]));
        assert_eq!(text, "Detected objects: lamp post, kiosk. Please be careful.");
    }

    #[test]
    fn test_fallback_listing_is_capped() {
        let names: Vec<String> = (0..40).map(|i| format!("gadget {}", i)).collect();
        let detected: DetectedObjects = names.iter().map(String::as_str).collect();

        let text = compose(&lexicon(), &detected);
        assert!(text.starts_with("Detected objects: gadget 0, gadget 1, "));
        assert!(text.contains("gadget 9 and 30 more."));
        assert!(!text.contains("gadget 10"));
        assert!(text.ends_with(CAUTION_PHRASE));
    }

    #[test]
    fn test_each_known_label_narrated_once_in_first_seen_order() {
        let lex = lexicon();
        let text = compose(&lex, &objects(&["person", "car", "Person"]));
        let expected = format!(
            "{} {}",
            lex.sentence("person").unwrap(),
            lex.sentence("car").unwrap()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_unknown_labels_are_dropped_when_any_label_is_known() {
        let lex = lexicon();
        let text = compose(&lex, &objects(&["kiosk", "dog"]));
        assert_eq!(text, lex.sentence("dog").unwrap());
    }
}
