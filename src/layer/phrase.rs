//! Exact and n-gram phrase matching with protected-range tracking
//! (spec.md §4.8).

use std::sync::Arc;

use crate::context::Context;
use crate::layer::{Layer, LayerPriority, LayerStats, LayerStatsSnapshot};
use crate::model::{ImpactLevel, LayerDebugInfo, LayerResult, ProtectedRange, TextToken, TokenType};
use crate::repository::PhraseRepository;

const MAX_PHRASE_WORDS: usize = 8;
const MIN_PHRASE_WORDS: usize = 2;

struct PhraseMatch {
    start_position: usize,
    end_position: usize,
    target_phrase: String,
    confidence: f32,
}

fn word_tokens(tokens: &[TextToken]) -> Vec<&TextToken> {
    tokens.iter().filter(|t| t.token_type == TokenType::Word).collect()
}

fn match_confidence(raw_confidence: u32, len: usize) -> f32 {
    (0.6f32).max(raw_confidence as f32 / 100.0 + 0.05 * (len as f32 - 2.0)).clamp(0.0, 1.0)
}

fn find_ngram_matches(
    repo: &PhraseRepository,
    words: &[&TextToken],
    language_pair: &str,
) -> Vec<PhraseMatch> {
    let mut matches = Vec::new();
    let mut claimed = vec![false; words.len()];

    for len in (MIN_PHRASE_WORDS..=MAX_PHRASE_WORDS).rev() {
        if len > words.len() {
            continue;
        }
        let mut i = 0usize;
        while i + len <= words.len() {
            if claimed[i..i + len].iter().any(|&c| c) {
                i += 1;
                continue;
            }
            let window = &words[i..i + len];
            let joined = window
                .iter()
                .map(|t| t.normalized.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if let Ok(Some(entry)) = repo.get_phrase_translation(&joined, language_pair) {
                for c in &mut claimed[i..i + len] {
                    *c = true;
                }
                matches.push(PhraseMatch {
                    start_position: window[0].start_position,
                    end_position: window[len - 1].end_position,
                    target_phrase: entry.target_phrase,
                    confidence: match_confidence(entry.confidence, len),
                });
                i += len;
            } else {
                i += 1;
            }
        }
    }

    matches.sort_by_key(|m| m.start_position);
    matches
}

fn reconstruct(text: &str, matches: &[PhraseMatch]) -> (String, Vec<ProtectedRange>) {
    let mut out = String::with_capacity(text.len());
    let mut ranges = Vec::with_capacity(matches.len());
    let mut cursor = 0usize;
    for m in matches {
        out.push_str(&text[cursor..m.start_position]);
        let out_start = out.len();
        out.push_str(&m.target_phrase);
        ranges.push(ProtectedRange::new(out_start, out.len()));
        cursor = m.end_position;
    }
    out.push_str(&text[cursor..]);
    (out, ranges)
}

pub struct PhraseLayer {
    repository: Arc<PhraseRepository>,
    stats: LayerStats,
}

impl PhraseLayer {
    #[must_use]
    pub fn new(repository: Arc<PhraseRepository>) -> Self {
        Self {
            repository,
            stats: LayerStats::new(),
        }
    }
}

impl Layer for PhraseLayer {
    fn name(&self) -> &str {
        "phrase"
    }

    fn description(&self) -> &str {
        "Exact and n-gram phrase matching with protected-range tracking"
    }

    fn priority(&self) -> LayerPriority {
        LayerPriority::Phrase
    }

    fn can_handle(&self, _text: &str, context: &Context) -> bool {
        context
            .preprocessing_tokens
            .as_ref()
            .map(|tokens| word_tokens(tokens).len() >= MIN_PHRASE_WORDS)
            .unwrap_or(false)
    }

    fn process(&self, text: &str, context: &mut Context) -> LayerResult {
        let language_pair = context.language_pair();
        let Some(tokens) = context.preprocessing_tokens.clone() else {
            return LayerResult::no_change(text, LayerDebugInfo::default());
        };
        let words = word_tokens(&tokens);

        let full_join = words.iter().map(|t| t.normalized.as_str()).collect::<Vec<_>>().join(" ");
        if let Ok(Some(entry)) = self.repository.get_phrase_translation(&full_join, &language_pair) {
            let confidence = (0.7f32).max(entry.confidence as f32 / 100.0).clamp(0.0, 1.0);
            let target = entry.target_phrase;
            context.phrase_protected_ranges = vec![ProtectedRange::new(0, target.len())];
            context.phrase_applied = true;

            let debug_info = LayerDebugInfo {
                layer_name: self.name().to_string(),
                is_successful: true,
                items_processed: 1,
                modifications_count: 1,
                impact_level: Some(ImpactLevel::High.into()),
                was_modified: true,
                ..Default::default()
            };
            return LayerResult::success(target, confidence, debug_info);
        }

        let matches = find_ngram_matches(&self.repository, &words, &language_pair);
        if matches.is_empty() {
            return LayerResult::no_change(text, LayerDebugInfo::default());
        }

        let count = matches.len();
        let mean_confidence = matches.iter().map(|m| m.confidence).sum::<f32>() / count as f32;
        let (reconstructed, ranges) = reconstruct(text, &matches);

        context.phrase_protected_ranges = ranges;
        context.phrase_applied = true;

        let debug_info = LayerDebugInfo {
            layer_name: self.name().to_string(),
            is_successful: true,
            items_processed: count,
            modifications_count: count,
            impact_level: Some(ImpactLevel::Medium.into()),
            was_modified: true,
            ..Default::default()
        };
        LayerResult::success(reconstructed, mean_confidence, debug_info)
    }

    fn stats(&self) -> LayerStatsSnapshot {
        self.stats.snapshot()
    }
}
