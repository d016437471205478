//! Per-word dictionary lookup honoring forced translations, exclusions, and
//! phrase-protected ranges (spec.md §4.9).

use std::sync::Arc;

use crate::context::Context;
use crate::layer::{Layer, LayerPriority, LayerStats, LayerStatsSnapshot};
use crate::model::{ImpactLevel, LayerDebugInfo, LayerResult};
use crate::repository::DictionaryRepository;

const MIN_CONFIDENCE: f32 = 0.3;
const SEARCH_LIMIT: usize = 5;

struct SimpleToken {
    text: String,
    start: usize,
    end: usize,
    is_word: bool,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '\'' || c == '-'
}

/// Simple ASCII-letter tokenizer (spec.md §4.9): contiguous runs of letters
/// (plus internal apostrophe/hyphen) are words, everything else is preserved
/// verbatim between them.
fn simple_tokenize(text: &str) -> Vec<SimpleToken> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let is_word = is_word_char(chars[i].1);
        let start = chars[i].0;
        let mut j = i + 1;
        while j < chars.len() && is_word_char(chars[j].1) == is_word {
            j += 1;
        }
        let end = if j < chars.len() { chars[j].0 } else { text.len() };
        tokens.push(SimpleToken {
            text: text[start..end].to_string(),
            start,
            end,
            is_word,
        });
        i = j;
    }
    tokens
}

fn candidate_confidence(
    frequency: u64,
    part_of_speech: &Option<String>,
    definition: &Option<String>,
    unique: bool,
    many_candidates: bool,
    quality_mode: bool,
) -> f32 {
    let mut score = 0.7f32;
    if frequency > 1000 {
        score += 0.2;
    }
    if frequency > 100 {
        score += 0.1;
    }
    if frequency < 10 {
        score -= 0.1;
    }
    if unique {
        score += 0.1;
    } else if many_candidates {
        score -= 0.1;
    }
    if part_of_speech.is_some() {
        score += 0.05;
    }
    if definition.is_some() {
        score += 0.05;
    }
    if quality_mode {
        score *= 0.9;
    }
    score.clamp(0.0, 1.0)
}

pub struct DictionaryLayer {
    repository: Arc<DictionaryRepository>,
    stats: LayerStats,
}

impl DictionaryLayer {
    #[must_use]
    pub fn new(repository: Arc<DictionaryRepository>) -> Self {
        Self {
            repository,
            stats: LayerStats::new(),
        }
    }

    /// Resolves a single normalized word against the repository, returning
    /// `(target, confidence)` when a usable candidate is found.
    fn lookup(&self, word: &str, language_pair: &str, quality_mode: bool) -> Option<(String, f32)> {
        if let Ok(Some(entry)) = self.repository.get(word, language_pair) {
            let confidence = candidate_confidence(
                entry.frequency,
                &entry.part_of_speech,
                &entry.definition,
                true,
                false,
                quality_mode,
            );
            return Some((entry.target_word, confidence));
        }
        if word.chars().count() < 2 {
            return None;
        }
        let candidates = self.repository.search(word, language_pair, SEARCH_LIMIT).ok()?;
        if candidates.is_empty() {
            return None;
        }
        let unique = candidates.len() == 1;
        let many = candidates.len() > 5;
        let best = candidates
            .into_iter()
            .map(|e| {
                let confidence = candidate_confidence(
                    e.frequency,
                    &e.part_of_speech,
                    &e.definition,
                    unique,
                    many,
                    quality_mode,
                );
                (e.target_word, confidence)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        if best.1 >= MIN_CONFIDENCE {
            Some(best)
        } else {
            None
        }
    }
}

impl Layer for DictionaryLayer {
    fn name(&self) -> &str {
        "dictionary"
    }

    fn description(&self) -> &str {
        "Per-word dictionary lookup honoring forced translations and exclusions"
    }

    fn priority(&self) -> LayerPriority {
        LayerPriority::Dictionary
    }

    fn process(&self, text: &str, context: &mut Context) -> LayerResult {
        let language_pair = context.language_pair();
        let quality_mode = context.is_quality_mode_enabled();
        let tokens = simple_tokenize(text);

        let mut out = String::with_capacity(text.len());
        let mut confidences = Vec::new();
        let mut translated_count = 0usize;
        let mut word_count = 0usize;
        let mut translated_tokens = Vec::new();

        for token in &tokens {
            if !token.is_word {
                out.push_str(&token.text);
                continue;
            }
            word_count += 1;
            let normalized = token.text.to_ascii_lowercase();

            if context.overlaps_protected_range(token.start, token.end) {
                out.push_str(&token.text);
                translated_tokens.push(token.text.clone());
                continue;
            }

            if let Some(target) = context.force_translations.get(&normalized) {
                out.push_str(target);
                context.dictionary_translations.insert(normalized.clone(), target.clone());
                translated_tokens.push(target.clone());
                confidences.push(1.0);
                translated_count += 1;
                continue;
            }

            if context.excluded_words.contains(&normalized) {
                out.push_str(&token.text);
                translated_tokens.push(token.text.clone());
                continue;
            }

            if let Some((target, confidence)) = self.lookup(&normalized, &language_pair, quality_mode) {
                out.push_str(&target);
                context.dictionary_translations.insert(normalized.clone(), target.clone());
                translated_tokens.push(target);
                confidences.push(confidence);
                translated_count += 1;
            } else {
                out.push_str(&token.text);
                translated_tokens.push(token.text.clone());
            }
        }

        if translated_count == 0 {
            return LayerResult::no_change(text, LayerDebugInfo::default());
        }

        context.translated_tokens = Some(translated_tokens);
        context.dictionary_success_rate = Some(if word_count == 0 {
            0.0
        } else {
            translated_count as f32 / word_count as f32
        });

        let mean_confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
        let debug_info = LayerDebugInfo {
            layer_name: self.name().to_string(),
            is_successful: true,
            items_processed: word_count,
            modifications_count: translated_count,
            impact_level: Some(if translated_count * 2 >= word_count {
                ImpactLevel::High.into()
            } else {
                ImpactLevel::Medium.into()
            }),
            was_modified: true,
            ..Default::default()
        };
        LayerResult::success(out, mean_confidence, debug_info)
    }

    fn stats(&self) -> LayerStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::storage::FileStorage;

    fn layer_with_entries(entries: &[(&str, &str, u64)]) -> (tempfile::TempDir, DictionaryLayer) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let repo = DictionaryRepository::new(storage, 100, Duration::from_secs(60));
        for (source, target, freq) in entries {
            repo.add(source, target, "en-ru", None, None, *freq).unwrap();
        }
        (dir, DictionaryLayer::new(Arc::new(repo)))
    }

    #[test]
    fn translates_known_words() {
        let (_dir, layer) = layer_with_entries(&[("hello", "привет", 500), ("world", "мир", 475)]);
        let mut ctx = Context::new("en", "ru");
        let result = layer.process("hello world", &mut ctx);
        assert!(result.is_success());
        assert_eq!(result.processed_text, "привет мир");
        assert!(result.confidence > 0.7);
    }

    #[test]
    fn forced_translation_overrides_lookup() {
        let (_dir, layer) = layer_with_entries(&[("cat", "кошка", 10)]);
        let mut ctx = Context::new("en", "ru");
        ctx.force_translations.insert("cat".to_string(), "КОТ".to_string());
        let result = layer.process("the cat", &mut ctx);
        assert!(result.processed_text.contains("КОТ"));
    }

    #[test]
    fn protected_range_is_not_retranslated() {
        let (_dir, layer) = layer_with_entries(&[("morning", "утро", 5), ("good", "хорошо", 5)]);
        let mut ctx = Context::new("en", "ru");
        // "Good morning" occupies byte range [0, 12) in the input, simulating
        // a prior phrase-layer substitution that already claimed that span.
        ctx.phrase_protected_ranges.push(crate::model::ProtectedRange::new(0, 12));
        let result = layer.process("Good morning everyone", &mut ctx);
        assert!(result.processed_text.starts_with("Good morning"));
    }

    #[test]
    fn unknown_words_report_no_change_when_nothing_translated() {
        let (_dir, layer) = layer_with_entries(&[]);
        let mut ctx = Context::new("en", "ru");
        let result = layer.process("xyz abc", &mut ctx);
        assert!(!result.is_error());
        assert_eq!(result.processed_text, "xyz abc");
    }
}
