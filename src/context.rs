//! Per-request mutable state shared across layers (spec.md §4.4). The source
//! system threads an untyped metadata dictionary between layers; per the
//! design notes in spec.md §9 we give each well-known key a named, typed
//! slot on this struct and keep only `additional_info` open-ended for
//! layer-specific diagnostics.

use std::collections::{HashMap, HashSet};

use crate::model::{ProtectedRange, TextToken};

#[derive(Clone, Debug)]
pub struct Context {
    pub source_language: String,
    pub target_language: String,
    pub session_id: Option<String>,
    pub debug_mode: bool,
    pub quality_mode: bool,

    pub original_text: Option<String>,
    pub translated_text: Option<String>,
    pub tokens: Option<Vec<String>>,

    // Named slots replacing the source's untyped metadata map (spec.md §9).
    pub preprocessing_tokens: Option<Vec<TextToken>>,
    pub token_count: Option<usize>,
    pub detected_language: Option<String>,
    pub phrase_protected_ranges: Vec<ProtectedRange>,
    pub phrase_applied: bool,
    pub dictionary_translations: HashMap<String, String>,
    pub translated_tokens: Option<Vec<String>>,
    pub dictionary_success_rate: Option<f32>,

    pub force_translations: HashMap<String, String>,
    pub excluded_words: HashSet<String>,

    /// Open-ended per-layer diagnostics surfaced in debug output. Anything
    /// that doesn't deserve a named slot above goes here.
    pub additional_info: HashMap<String, String>,
}

impl Context {
    #[must_use]
    pub fn new(source_language: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            source_language: source_language.into().trim().to_ascii_lowercase(),
            target_language: target_language.into().trim().to_ascii_lowercase(),
            session_id: None,
            debug_mode: false,
            quality_mode: false,
            original_text: None,
            translated_text: None,
            tokens: None,
            preprocessing_tokens: None,
            token_count: None,
            detected_language: None,
            phrase_protected_ranges: Vec::new(),
            phrase_applied: false,
            dictionary_translations: HashMap::new(),
            translated_tokens: None,
            dictionary_success_rate: None,
            force_translations: HashMap::new(),
            excluded_words: HashSet::new(),
            additional_info: HashMap::new(),
        }
    }

    #[must_use]
    pub fn language_pair(&self) -> String {
        format!("{}-{}", self.source_language, self.target_language)
    }

    #[must_use]
    pub fn is_quality_mode_enabled(&self) -> bool {
        self.quality_mode
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.additional_info.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.additional_info.get(key).map(String::as_str)
    }

    /// Whether `[start, end)` in OUTPUT coordinates overlaps any range the
    /// phrase layer has already claimed. Later layers must not rewrite such
    /// spans (spec.md §8 invariant).
    #[must_use]
    pub fn overlaps_protected_range(&self, start: usize, end: usize) -> bool {
        self.phrase_protected_ranges
            .iter()
            .any(|r| r.overlaps_span(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_pair_is_lowercased_and_joined() {
        let ctx = Context::new("EN", "RU");
        assert_eq!(ctx.language_pair(), "en-ru");
    }

    #[test]
    fn metadata_set_get_roundtrips() {
        let mut ctx = Context::new("en", "ru");
        ctx.set_metadata("foo", "bar");
        assert_eq!(ctx.get_metadata("foo"), Some("bar"));
        assert_eq!(ctx.get_metadata("missing"), None);
    }

    #[test]
    fn protected_range_overlap_detection() {
        let mut ctx = Context::new("en", "ru");
        ctx.phrase_protected_ranges.push(ProtectedRange::new(5, 10));
        assert!(ctx.overlaps_protected_range(7, 12));
        assert!(!ctx.overlaps_protected_range(10, 15));
        assert!(!ctx.overlaps_protected_range(0, 5));
    }
}
