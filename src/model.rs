//! Data-model entities shared across repositories, layers, and the engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two lowercase ASCII language codes joined by `-`, e.g. `en-ru`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.trim().to_ascii_lowercase(),
            target: target.trim().to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.source.is_empty() && !self.target.is_empty()
    }

    #[must_use]
    pub fn as_key(&self) -> String {
        format!("{}-{}", self.source, self.target)
    }

    #[must_use]
    pub fn dir_name(&self) -> String {
        self.as_key()
    }
}

impl std::fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DictionaryEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub source_word: String,
    pub target_word: String,
    pub language_pair: String,
    #[serde(default)]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub frequency: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhraseEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub source_phrase: String,
    pub target_phrase: String,
    pub language_pair: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub confidence: u32,
    #[serde(default)]
    pub frequency: u64,
    #[serde(default)]
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhraseEntry {
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.source_phrase.split_whitespace().count()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranslationHistoryEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub original_text: String,
    pub translated_text: String,
    pub language_pair: String,
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserSetting {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserTranslationEdit {
    #[serde(default)]
    pub id: Option<String>,
    pub original_text: String,
    pub original_translation: String,
    pub user_translation: String,
    pub language_pair: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RulePattern {
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrammarRule {
    pub rule_id: String,
    pub source_language: String,
    pub target_language: String,
    pub description: String,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    pub replacement: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WordOrderRule {
    pub rule_id: String,
    pub source_language: String,
    pub target_language: String,
    pub description: String,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    pub replacement: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostProcessingRule {
    pub rule_id: String,
    pub source_language: String,
    pub target_language: String,
    pub description: String,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    pub replacement: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub target_languages: Vec<String>,
}

/// Applies to either the common trio of rule kinds.
pub trait RegexRule {
    fn pattern(&self) -> &str;
    fn case_sensitive(&self) -> bool;
    fn replacement(&self) -> &str;
    fn priority(&self) -> i32;
    fn conditions(&self) -> &[String];
    fn source_language(&self) -> &str;
    fn target_language(&self) -> &str;

    fn applies_to(&self, source: &str, target: &str) -> bool {
        let matches_side = |rule_side: &str, actual: &str| {
            rule_side.eq_ignore_ascii_case("any") || rule_side.eq_ignore_ascii_case(actual)
        };
        matches_side(self.source_language(), source) && matches_side(self.target_language(), target)
    }
}

macro_rules! impl_regex_rule {
    ($ty:ty) => {
        impl RegexRule for $ty {
            fn pattern(&self) -> &str {
                &self.pattern
            }
            fn case_sensitive(&self) -> bool {
                self.case_sensitive
            }
            fn replacement(&self) -> &str {
                &self.replacement
            }
            fn priority(&self) -> i32 {
                self.priority
            }
            fn conditions(&self) -> &[String] {
                &self.conditions
            }
            fn source_language(&self) -> &str {
                &self.source_language
            }
            fn target_language(&self) -> &str {
                &self.target_language
            }
        }
    };
}

impl_regex_rule!(GrammarRule);
impl_regex_rule!(WordOrderRule);
impl_regex_rule!(PostProcessingRule);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Word,
    Number,
    Punctuation,
    Whitespace,
    Newline,
    Special,
    Email,
    Url,
    Hashtag,
    Mention,
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextToken {
    pub original: String,
    pub normalized: String,
    pub start_position: usize,
    pub end_position: usize,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub confidence: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl TextToken {
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_position.saturating_sub(self.start_position)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_word(&self) -> bool {
        self.token_type == TokenType::Word
    }
}

/// Half-open `[start, end)` interval in OUTPUT-text coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRange {
    pub start: usize,
    pub end: usize,
}

impl ProtectedRange {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn overlaps(&self, other: &ProtectedRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[must_use]
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }

    #[must_use]
    pub fn overlaps_span(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImpactLevel {
    None,
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Default)]
pub struct LayerDebugInfo {
    pub layer_name: String,
    pub processing_time_ms: u64,
    pub is_successful: bool,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub items_processed: usize,
    pub modifications_count: usize,
    pub impact_level: Option<ImpactLevelDebug>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub input_text: Option<String>,
    pub output_text: Option<String>,
    pub was_modified: bool,
    pub additional_info: HashMap<String, String>,
    pub warnings: Vec<String>,
}

/// Serializable mirror of [`ImpactLevel`]; kept distinct because debug info is
/// surfaced to callers and must round-trip through plain data, unlike the
/// enum used internally by layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImpactLevelDebug {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl From<ImpactLevel> for ImpactLevelDebug {
    fn from(v: ImpactLevel) -> Self {
        match v {
            ImpactLevel::None => ImpactLevelDebug::None,
            ImpactLevel::Low => ImpactLevelDebug::Low,
            ImpactLevel::Medium => ImpactLevelDebug::Medium,
            ImpactLevel::High => ImpactLevelDebug::High,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerOutcome {
    Success,
    NoChange,
    Error,
}

#[derive(Clone, Debug)]
pub struct LayerResult {
    pub processed_text: String,
    pub outcome: LayerOutcome,
    pub error_message: Option<String>,
    pub confidence: f32,
    pub debug_info: LayerDebugInfo,
    pub metadata: HashMap<String, String>,
}

impl LayerResult {
    #[must_use]
    pub fn success(text: impl Into<String>, confidence: f32, debug_info: LayerDebugInfo) -> Self {
        Self {
            processed_text: text.into(),
            outcome: LayerOutcome::Success,
            error_message: None,
            confidence: confidence.clamp(0.0, 1.0),
            debug_info,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn no_change(text: impl Into<String>, mut debug_info: LayerDebugInfo) -> Self {
        debug_info.is_successful = true;
        debug_info.was_modified = false;
        Self {
            processed_text: text.into(),
            outcome: LayerOutcome::NoChange,
            error_message: None,
            confidence: 1.0,
            debug_info,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn error(text: impl Into<String>, message: impl Into<String>, layer_name: &str) -> Self {
        let message = message.into();
        let debug_info = LayerDebugInfo {
            layer_name: layer_name.to_string(),
            is_successful: false,
            has_error: true,
            error_message: Some(message.clone()),
            ..Default::default()
        };
        Self {
            processed_text: text.into(),
            outcome: LayerOutcome::Error,
            error_message: Some(message),
            confidence: 0.0,
            debug_info,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, LayerOutcome::Success)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, LayerOutcome::Error)
    }
}

/// Computed once per post-processing run (spec.md §4.12).
#[derive(Clone, Debug)]
pub struct TextQualityMetrics {
    pub character_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    pub mean_words_per_sentence: f32,
    pub has_correct_capitalization: bool,
    pub has_correct_punctuation: bool,
    pub corrections_made: usize,
    pub quality_score: f32,
}

#[derive(Clone, Debug)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_count: usize,
    pub estimated_memory_bytes: usize,
}

/// Snapshot returned by `Engine::get_metrics()`: aggregates cache metrics
/// (§4.2), per-layer statistics (§4.5), and a running request counter.
#[derive(Clone, Debug)]
pub struct EngineMetrics {
    pub requests_total: u64,
    pub requests_errored: u64,
    pub requests_timed_out: u64,
    pub dictionary_cache: CacheMetricsSnapshot,
    pub phrase_cache: CacheMetricsSnapshot,
    pub layer_stats: Vec<(String, LayerStatsSnapshotDebug)>,
}

/// Plain-data mirror of `layer::LayerStatsSnapshot`, kept in `model` so this
/// module doesn't need to depend on `layer` for a metrics-reporting type.
#[derive(Clone, Copy, Debug, Default)]
pub struct LayerStatsSnapshotDebug {
    pub processed: u64,
    pub succeeded: u64,
    pub errored: u64,
    pub skipped: u64,
    pub total_time_ms: u64,
}

#[derive(Clone, Debug)]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub language_pair: String,
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub layers_processed: usize,
    pub layer_results: Vec<LayerDebugInfo>,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub cache_metrics: Option<CacheMetricsSnapshot>,
    pub timestamp: DateTime<Utc>,
    pub quality_score: Option<f32>,
    pub alternatives: Vec<String>,
    /// Compact snapshot of the request `Context`'s `additional_info`, for debugging.
    pub context_debug: HashMap<String, String>,
}
