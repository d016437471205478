//! Engine configuration: every knob named in spec.md §6, loaded from TOML
//! the way the teacher's `AppConfig`/`PipelineSection` is (`#[serde(default)]`
//! on every field, a `load_config` helper, a fully-populated `Default`).

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::cache::{CACHE_TTL_MS, MAX_PHRASES_CACHE, MAX_WORDS_CACHE};
use crate::layer::post_processing::PostProcessingConfig;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub layers: LayersSection,
    #[serde(default)]
    pub post_processing: PostProcessingSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CacheSection {
    #[serde(default)]
    pub max_words_cache: Option<usize>,
    #[serde(default)]
    pub max_phrases_cache: Option<usize>,
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
}

impl CacheSection {
    #[must_use]
    pub fn words_capacity(&self) -> usize {
        self.max_words_cache.unwrap_or(MAX_WORDS_CACHE)
    }

    #[must_use]
    pub fn phrases_capacity(&self) -> usize {
        self.max_phrases_cache.unwrap_or(MAX_PHRASES_CACHE)
    }

    #[must_use]
    pub fn ttl_ms(&self) -> u64 {
        self.cache_ttl_ms.unwrap_or(CACHE_TTL_MS)
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineSection {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_pending: Option<usize>,
}

impl EngineSection {
    #[must_use]
    pub fn max_pending_or_default(&self) -> usize {
        self.max_pending.unwrap_or(256)
    }
}

/// Per-layer enable/disable toggles, matched against `Layer::name()`.
#[derive(Clone, Debug, Deserialize)]
pub struct LayersSection {
    #[serde(default = "default_true")]
    pub preprocessing: bool,
    #[serde(default = "default_true")]
    pub phrase: bool,
    #[serde(default = "default_true")]
    pub dictionary: bool,
    #[serde(default = "default_true")]
    pub grammar: bool,
    #[serde(default = "default_true")]
    pub word_order: bool,
    #[serde(default = "default_true")]
    pub post_processing: bool,
}

impl Default for LayersSection {
    fn default() -> Self {
        Self {
            preprocessing: true,
            phrase: true,
            dictionary: true,
            grammar: true,
            word_order: true,
            post_processing: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PostProcessingSection {
    #[serde(default)]
    pub enable_spacing: Option<bool>,
    #[serde(default)]
    pub enable_capitalization: Option<bool>,
    #[serde(default)]
    pub enable_punctuation: Option<bool>,
    #[serde(default)]
    pub enable_language_formatting: Option<bool>,
    #[serde(default)]
    pub enable_rules: Option<bool>,
    #[serde(default)]
    pub enable_final_cleanup: Option<bool>,
    #[serde(default)]
    pub add_missing_periods: Option<bool>,
}

impl PostProcessingSection {
    #[must_use]
    pub fn to_layer_config(&self) -> PostProcessingConfig {
        let defaults = PostProcessingConfig::default();
        PostProcessingConfig {
            enable_spacing: self.enable_spacing.unwrap_or(defaults.enable_spacing),
            enable_capitalization: self.enable_capitalization.unwrap_or(defaults.enable_capitalization),
            enable_punctuation: self.enable_punctuation.unwrap_or(defaults.enable_punctuation),
            enable_language_formatting: self
                .enable_language_formatting
                .unwrap_or(defaults.enable_language_formatting),
            enable_rules: self.enable_rules.unwrap_or(defaults.enable_rules),
            enable_final_cleanup: self.enable_final_cleanup.unwrap_or(defaults.enable_final_cleanup),
            add_missing_periods: self.add_missing_periods.unwrap_or(defaults.add_missing_periods),
        }
    }
}

/// Reads and parses `path` as TOML into an [`EngineConfig`]. Missing
/// sections/fields fall back to their documented defaults.
pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: EngineConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.cache.words_capacity(), MAX_WORDS_CACHE);
        assert_eq!(cfg.cache.phrases_capacity(), MAX_PHRASES_CACHE);
        assert_eq!(cfg.cache.ttl_ms(), CACHE_TTL_MS);
        assert!(cfg.layers.dictionary);
        assert!(!cfg.post_processing.to_layer_config().add_missing_periods);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let toml_text = r#"
            [cache]
            max_words_cache = 500

            [layers]
            grammar = false
        "#;
        let cfg: EngineConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.cache.words_capacity(), 500);
        assert_eq!(cfg.cache.phrases_capacity(), MAX_PHRASES_CACHE);
        assert!(!cfg.layers.grammar);
        assert!(cfg.layers.dictionary);
    }

    #[test]
    fn load_config_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glossforge.toml");
        std::fs::write(&path, "[engine]\ndebug = true\nmax_pending = 64\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert!(cfg.engine.debug);
        assert_eq!(cfg.engine.max_pending_or_default(), 64);
    }
}
