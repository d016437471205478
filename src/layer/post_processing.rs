//! Spacing, capitalization, punctuation, language formatting, rule
//! application, final cleanup, and quality scoring (spec.md §4.12).

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::layer::{Layer, LayerPriority, LayerStats, LayerStatsSnapshot};
use crate::model::{ImpactLevel, LayerDebugInfo, LayerResult, RegexRule, TextQualityMetrics};
use crate::regex_util::{apply_replacement, compile_pattern};
use crate::repository::PostProcessingRulesRepository;

static WHITESPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws run"));
static SPACE_BEFORE_PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,.!?;:])").expect("space before punct"));
// Only matches a punctuation char preceded by a non-punctuation char (or
// start of string), so runs like "..." are left alone instead of having a
// space spliced into the middle of the ellipsis.
static PUNCT_LETTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^,.!?;:]|^)([,.!?;:])([A-Za-zА-Яа-яЁё])").expect("punct letter"));
static OPEN_PAREN_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s+").expect("open paren"));
static CLOSE_PAREN_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\)").expect("close paren"));
static SENTENCE_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?]\s+)").expect("sentence split"));
static STANDALONE_I_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bi\b").expect("standalone i"));
static FR_PUNCT_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*([:;!?])").expect("fr punct space"));
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("quoted"));
static REPEATED_DOTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("repeated dots"));
static REPEATED_BANG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").expect("repeated bang"));
static REPEATED_QUESTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").expect("repeated question"));
static TERMINAL_THEN_CAPITAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?])([A-ZА-Я])").expect("terminal then capital"));

static DE_STOPWORDS: &[&str] = &[
    "und", "oder", "aber", "nicht", "auch", "mit", "für", "von", "nach", "bei", "wird", "sind",
    "war", "eine", "einen", "einem",
];

#[derive(Clone, Debug)]
pub struct PostProcessingConfig {
    pub enable_spacing: bool,
    pub enable_capitalization: bool,
    pub enable_punctuation: bool,
    pub enable_language_formatting: bool,
    pub enable_rules: bool,
    pub enable_final_cleanup: bool,
    pub add_missing_periods: bool,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            enable_spacing: true,
            enable_capitalization: true,
            enable_punctuation: true,
            enable_language_formatting: true,
            enable_rules: true,
            enable_final_cleanup: true,
            add_missing_periods: false,
        }
    }
}

fn apply_spacing(text: &str) -> String {
    let mut out = WHITESPACE_RUN_RE.replace_all(text, " ").into_owned();
    out = SPACE_BEFORE_PUNCT_RE.replace_all(&out, "$1").into_owned();
    out = PUNCT_LETTER_RE.replace_all(&out, "$1$2 $3").into_owned();
    out = OPEN_PAREN_SPACE_RE.replace_all(&out, "(").into_owned();
    out = CLOSE_PAREN_SPACE_RE.replace_all(&out, ")").into_owned();
    out.trim().to_string()
}

fn capitalize_first(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn apply_capitalization(text: &str, target_language: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0usize;
    // A fragment with no `.!?` boundary anywhere is not known to be a sentence
    // start (dictionary/phrase layers often hand this a single word or short
    // phrase, not a full sentence), so it's left as upstream layers produced it.
    let mut capitalize_next = SENTENCE_SPLIT_RE.is_match(text);
    for m in SENTENCE_SPLIT_RE.find_iter(text) {
        let segment = &text[last_end..m.start()];
        if capitalize_next {
            out.push_str(&capitalize_first(segment));
        } else {
            out.push_str(segment);
        }
        out.push_str(m.as_str());
        capitalize_next = true;
        last_end = m.end();
    }
    let tail = &text[last_end..];
    if capitalize_next {
        out.push_str(&capitalize_first(tail));
    } else {
        out.push_str(tail);
    }

    if target_language == "en" {
        out = STANDALONE_I_RE.replace_all(&out, "I").into_owned();
    } else if target_language == "de" {
        out = out
            .split(' ')
            .map(|word| {
                let lower = word.to_ascii_lowercase();
                if word.chars().count() > 3 && !DE_STOPWORDS.contains(&lower.as_str()) {
                    capitalize_first(word)
                } else {
                    word.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
    }
    out
}

fn apply_punctuation(text: &str, target_language: &str, add_missing_periods: bool) -> String {
    let mut out = text.to_string();
    if add_missing_periods && !out.trim().is_empty() && !out.trim_end().ends_with(['.', '!', '?']) {
        out = format!("{}.", out.trim_end());
    }
    if target_language == "fr" {
        out = FR_PUNCT_SPACE_RE.replace_all(&out, "\u{00A0}$1").into_owned();
    }
    out
}

fn apply_language_formatting(text: &str, target_language: &str) -> String {
    match target_language {
        "es" | "ru" => QUOTED_RE.replace_all(text, "«$1»").into_owned(),
        "de" => QUOTED_RE.replace_all(text, "„$1\"").into_owned(),
        "fr" => QUOTED_RE.replace_all(text, "« $1 »").into_owned(),
        _ => text.to_string(),
    }
}

fn apply_final_cleanup(text: &str) -> String {
    let mut out = REPEATED_DOTS_RE.replace_all(text, "...").into_owned();
    out = REPEATED_BANG_RE.replace_all(&out, "!").into_owned();
    out = REPEATED_QUESTION_RE.replace_all(&out, "?").into_owned();
    out = TERMINAL_THEN_CAPITAL_RE.replace_all(&out, "$1 $2").into_owned();
    out.trim().to_string()
}

fn compute_quality(text: &str, corrections_made: usize) -> TextQualityMetrics {
    let character_count = text.chars().count();
    let word_count = text.split_whitespace().count();
    let sentence_count = text.matches(['.', '!', '?']).count().max(usize::from(!text.trim().is_empty()));
    let mean_words_per_sentence = if sentence_count == 0 {
        0.0
    } else {
        word_count as f32 / sentence_count as f32
    };
    let has_correct_capitalization = text
        .trim()
        .chars()
        .find(|c| c.is_alphabetic())
        .map(|c| c.is_uppercase())
        .unwrap_or(true);
    let has_correct_punctuation = text.trim().is_empty() || text.trim_end().ends_with(['.', '!', '?', '"', '»']);

    let mut quality_score = 1.0f32;
    if !has_correct_capitalization {
        quality_score -= 0.1;
    }
    if !has_correct_punctuation {
        quality_score -= 0.1;
    }

    TextQualityMetrics {
        character_count,
        word_count,
        sentence_count,
        mean_words_per_sentence,
        has_correct_capitalization,
        has_correct_punctuation,
        corrections_made,
        quality_score: quality_score.clamp(0.0, 1.0),
    }
}

pub struct PostProcessingLayer {
    repository: Arc<PostProcessingRulesRepository>,
    config: PostProcessingConfig,
    stats: LayerStats,
}

impl PostProcessingLayer {
    #[must_use]
    pub fn new(repository: Arc<PostProcessingRulesRepository>, config: PostProcessingConfig) -> Self {
        Self {
            repository,
            config,
            stats: LayerStats::new(),
        }
    }

    fn apply_rules(&self, text: &str, context: &Context) -> (String, bool) {
        let language_pair = context.language_pair();
        let rules = self.repository.get_rules(&language_pair).unwrap_or_default();
        let tokens = context.tokens.clone().unwrap_or_default();

        let mut current = text.to_string();
        let mut applied = false;
        for rule in rules.iter().filter(|r| {
            let target_ok = rule.is_global
                || rule.target_languages.is_empty()
                || rule.target_languages.iter().any(|l| l == &context.target_language);
            target_ok
                && r.applies_to(&context.source_language, &context.target_language)
                && r.conditions().iter().all(|c| match c.strip_prefix("has_token:") {
                    Some(needle) => tokens.iter().any(|t| t.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())),
                    None => true,
                })
        }) {
            if let Ok(re) = compile_pattern(rule.pattern(), rule.case_sensitive()) {
                let replaced = apply_replacement(&re, &current, rule.replacement());
                if replaced != current {
                    applied = true;
                }
                current = replaced;
            }
        }
        (current, applied)
    }
}

impl Layer for PostProcessingLayer {
    fn name(&self) -> &str {
        "post_processing"
    }

    fn description(&self) -> &str {
        "Spacing, capitalization, punctuation, formatting, rules, quality scoring"
    }

    fn priority(&self) -> LayerPriority {
        LayerPriority::PostProcessing
    }

    fn process(&self, text: &str, context: &mut Context) -> LayerResult {
        let mut current = text.to_string();
        let mut corrections = 0usize;

        if self.config.enable_spacing {
            let spaced = apply_spacing(&current);
            if spaced != current {
                corrections += 1;
            }
            current = spaced;
        }
        if self.config.enable_capitalization {
            let capitalized = apply_capitalization(&current, &context.target_language);
            if capitalized != current {
                corrections += 1;
            }
            current = capitalized;
        }
        if self.config.enable_punctuation {
            let punctuated = apply_punctuation(&current, &context.target_language, self.config.add_missing_periods);
            if punctuated != current {
                corrections += 1;
            }
            current = punctuated;
        }
        if self.config.enable_language_formatting {
            let formatted = apply_language_formatting(&current, &context.target_language);
            if formatted != current {
                corrections += 1;
            }
            current = formatted;
        }
        if self.config.enable_rules {
            let (ruled, applied) = self.apply_rules(&current, context);
            if applied {
                corrections += 1;
            }
            current = ruled;
        }
        if self.config.enable_final_cleanup {
            let cleaned = apply_final_cleanup(&current);
            if cleaned != current {
                corrections += 1;
            }
            current = cleaned;
        }

        let quality = compute_quality(&current, corrections);
        context.set_metadata("quality_score", quality.quality_score.to_string());

        let debug_info = LayerDebugInfo {
            layer_name: self.name().to_string(),
            is_successful: true,
            items_processed: 1,
            modifications_count: corrections,
            impact_level: Some(if corrections == 0 {
                ImpactLevel::None.into()
            } else {
                ImpactLevel::Low.into()
            }),
            was_modified: current != text,
            ..Default::default()
        };

        if current == text {
            return LayerResult::no_change(text, debug_info);
        }
        LayerResult::success(current, quality.quality_score, debug_info)
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

    fn layer() -> (tempfile::TempDir, PostProcessingLayer) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let repo = PostProcessingRulesRepository::new(storage, 10, Duration::from_secs(60));
        (dir, PostProcessingLayer::new(Arc::new(repo), PostProcessingConfig::default()))
    }

    #[test]
    fn quote_substitution_for_russian_target() {
        let (_dir, layer) = layer();
        let mut ctx = Context::new("en", "ru");
        let result = layer.process("\"test\"", &mut ctx);
        assert_eq!(result.processed_text, "«test»");
    }

    #[test]
    fn collapses_repeated_punctuation() {
        let (_dir, layer) = layer();
        let mut ctx = Context::new("en", "en");
        let result = layer.process("wait....what!!", &mut ctx);
        assert_eq!(result.processed_text, "wait...what!");
    }

    #[test]
    fn spacing_removes_space_before_punctuation() {
        let (_dir, layer) = layer();
        let mut ctx = Context::new("en", "en");
        let result = layer.process("hello , world", &mut ctx);
        assert_eq!(result.processed_text, "hello, world");
    }

    #[test]
    fn capitalizes_each_detected_sentence_boundary() {
        let (_dir, layer) = layer();
        let mut ctx = Context::new("en", "en");
        let result = layer.process("hello world. goodbye now.", &mut ctx);
        assert_eq!(result.processed_text, "Hello world. Goodbye now.");
    }

    #[test]
    fn bare_fragment_without_terminator_is_not_capitalized() {
        let (_dir, layer) = layer();
        let mut ctx = Context::new("en", "ru");
        let result = layer.process("привет мир", &mut ctx);
        assert_eq!(result.processed_text, "привет мир");
    }

    #[test]
    fn quality_metrics_flag_missing_terminal_punctuation() {
        let metrics = compute_quality("hello world", 0);
        assert!(!metrics.has_correct_punctuation);
        assert!(metrics.quality_score < 1.0);
    }
}
