//! Orchestrates repositories, the layer pipeline, and request admission
//! behind the external interface of spec.md §6.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::cache::CacheKind;
use crate::config::{load_config, EngineConfig};
use crate::context::Context;
use crate::error::{EngineError, EngineResult};
use crate::layer::dictionary::DictionaryLayer;
use crate::layer::grammar::GrammarLayer;
use crate::layer::phrase::PhraseLayer;
use crate::layer::post_processing::PostProcessingLayer;
use crate::layer::preprocessing::PreprocessingLayer;
use crate::layer::word_order::WordOrderLayer;
use crate::model::{CacheMetricsSnapshot, EngineMetrics, LayerStatsSnapshotDebug, TranslationResult};
use crate::pipeline::{timeout_deadline, Pipeline};
use crate::repository::{
    DictionaryRepository, GrammarRulesRepository, PhraseRepository, PostProcessingRulesRepository,
    UserDataRepository, WordOrderRulesRepository,
};
use crate::storage::FileStorage;

/// Named repository handles kept alongside the pipeline for administration
/// calls (`get_cache_info`, `clear_cache`, `reset`) that the pipeline itself
/// has no reason to expose.
struct Repositories {
    dictionary: Arc<DictionaryRepository>,
    phrase: Arc<PhraseRepository>,
    grammar_rules: Arc<GrammarRulesRepository>,
    word_order_rules: Arc<WordOrderRulesRepository>,
    post_processing_rules: Arc<PostProcessingRulesRepository>,
    user_data: Arc<UserDataRepository>,
}

#[derive(Default)]
struct RequestCounters {
    total: AtomicU64,
    errored: AtomicU64,
    timed_out: AtomicU64,
}

/// Long-lived, thread-safe translation engine. Construct once per process
/// (or per data directory) with [`Engine::initialize`] and share behind an
/// `Arc` across concurrent requests.
pub struct Engine {
    config: EngineConfig,
    repositories: Repositories,
    pipeline: Pipeline,
    admission: Semaphore,
    counters: RequestCounters,
}

impl Engine {
    /// Builds every repository and layer against `data_dir` (created if
    /// missing) and an optional config. When `config` is `None`, a
    /// `glossforge.toml` in `data_dir` is used if present, else defaults.
    pub fn initialize(data_dir: impl AsRef<Path>, config: Option<EngineConfig>) -> EngineResult<Self> {
        let data_dir = data_dir.as_ref();
        let config = match config {
            Some(c) => c,
            None => Self::load_config_or_default(data_dir),
        };

        let storage = FileStorage::new(data_dir).map_err(|e| {
            EngineError::storage(crate::error::StorageErrorKind::Write, data_dir.to_path_buf(), e)
        })?;

        let ttl = Duration::from_millis(config.cache.ttl_ms());
        let dictionary = Arc::new(DictionaryRepository::new(
            storage.clone(),
            config.cache.words_capacity(),
            ttl,
        ));
        let phrase = Arc::new(PhraseRepository::new(storage.clone(), config.cache.phrases_capacity(), ttl));
        let grammar_rules = Arc::new(GrammarRulesRepository::new(storage.clone(), 256, ttl));
        let word_order_rules = Arc::new(WordOrderRulesRepository::new(storage.clone(), 256, ttl));
        let post_processing_rules = Arc::new(PostProcessingRulesRepository::new(storage.clone(), 256, ttl));
        let user_data = Arc::new(UserDataRepository::new(storage));

        let mut pipeline = Pipeline::new();
        pipeline.register(Box::new(PreprocessingLayer::new()));
        pipeline.register(Box::new(PhraseLayer::new(phrase.clone())));
        pipeline.register(Box::new(DictionaryLayer::new(dictionary.clone())));
        pipeline.register(Box::new(GrammarLayer::new(grammar_rules.clone())));
        pipeline.register(Box::new(WordOrderLayer::new(word_order_rules.clone())));
        pipeline.register(Box::new(PostProcessingLayer::new(
            post_processing_rules.clone(),
            config.post_processing.to_layer_config(),
        )));

        pipeline.set_enabled("preprocessing", config.layers.preprocessing);
        pipeline.set_enabled("phrase", config.layers.phrase);
        pipeline.set_enabled("dictionary", config.layers.dictionary);
        pipeline.set_enabled("grammar", config.layers.grammar);
        pipeline.set_enabled("word_order", config.layers.word_order);
        pipeline.set_enabled("post_processing", config.layers.post_processing);

        let max_pending = config.engine.max_pending_or_default();
        info!(data_dir = %data_dir.display(), max_pending, "engine initialized");

        Ok(Self {
            config,
            repositories: Repositories {
                dictionary,
                phrase,
                grammar_rules,
                word_order_rules,
                post_processing_rules,
                user_data,
            },
            pipeline,
            admission: Semaphore::new(max_pending),
            counters: RequestCounters::default(),
        })
    }

    fn load_config_or_default(data_dir: &Path) -> EngineConfig {
        let candidate = data_dir.join("glossforge.toml");
        if candidate.exists() {
            match load_config(&candidate) {
                Ok(cfg) => return cfg,
                Err(err) => warn!(path = %candidate.display(), error = %err, "failed to parse config, using defaults"),
            }
        }
        EngineConfig::default()
    }

    #[must_use]
    pub fn user_data(&self) -> &Arc<UserDataRepository> {
        &self.repositories.user_data
    }

    #[must_use]
    pub fn dictionary(&self) -> &Arc<DictionaryRepository> {
        &self.repositories.dictionary
    }

    #[must_use]
    pub fn phrase(&self) -> &Arc<PhraseRepository> {
        &self.repositories.phrase
    }

    /// Translates `text` from `source_language` to `target_language`, honoring
    /// `request_timeout_ms` from config if set. `context` seeds force
    /// translations, exclusions, session id, and debug/quality flags.
    pub async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        context: Option<Context>,
    ) -> EngineResult<TranslationResult> {
        let deadline = self.config.engine.request_timeout_ms.map(Duration::from_millis);
        self.translate_with_deadline(text, source_language, target_language, context, deadline)
            .await
    }

    /// Same as [`Engine::translate`] but with an explicit per-call deadline,
    /// overriding the configured `request_timeout_ms`.
    pub async fn translate_with_deadline(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        context: Option<Context>,
        deadline: Option<Duration>,
    ) -> EngineResult<TranslationResult> {
        if text.is_empty() {
            return Err(EngineError::validation("text must not be empty"));
        }
        if source_language.trim().is_empty() || target_language.trim().is_empty() {
            return Err(EngineError::validation("source/target language must not be empty"));
        }

        let pending = self.admission.try_acquire().map_err(|_| {
            let pending = self.config.engine.max_pending_or_default();
            EngineError::QueueOverflow {
                pending,
                max_pending: pending,
            }
        })?;
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let mut context = context.unwrap_or_else(|| Context::new(source_language, target_language));
        context.source_language = source_language.trim().to_ascii_lowercase();
        context.target_language = target_language.trim().to_ascii_lowercase();

        let start = Instant::now();
        let run_deadline = timeout_deadline(deadline);
        let run = self.pipeline.run(text, &mut context, run_deadline);
        let processing_time_ms = start.elapsed().as_millis() as u64;
        drop(pending);

        let has_error = run.timed_out;
        let error_message = if run.timed_out {
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            self.counters.errored.fetch_add(1, Ordering::Relaxed);
            Some(format!(
                "request timed out after {processing_time_ms}ms with {} of {} layers executed",
                run.debug_infos.len(),
                self.pipeline.layer_stats().len()
            ))
        } else {
            None
        };

        let confidence = if run.confidences.is_empty() {
            0.0
        } else {
            run.confidences.iter().sum::<f32>() / run.confidences.len() as f32
        };

        let quality_score = context
            .get_metadata("quality_score")
            .and_then(|s| s.parse::<f32>().ok());

        let context_debug: HashMap<String, String> = context.additional_info.clone();

        Ok(TranslationResult {
            original_text: text.to_string(),
            translated_text: run.text,
            language_pair: context.language_pair(),
            confidence,
            processing_time_ms,
            layers_processed: run.debug_infos.len(),
            layer_results: run.debug_infos,
            has_error,
            error_message,
            cache_metrics: Some(self.repositories.dictionary.cache_metrics()),
            timestamp: Utc::now(),
            quality_score,
            alternatives: Vec::new(),
            context_debug,
        })
    }

    /// Releases no long-lived handles (the storage layer opens/closes files
    /// per operation) but documents the lifecycle hook spec.md §6 expects;
    /// clears caches so a subsequent `initialize` starts cold.
    pub fn dispose(&self) {
        self.clear_cache(CacheKind::Generic);
    }

    #[must_use]
    pub fn get_metrics(&self) -> EngineMetrics {
        let layer_stats = self
            .pipeline
            .layer_stats()
            .into_iter()
            .map(|(name, snap)| {
                (
                    name,
                    LayerStatsSnapshotDebug {
                        processed: snap.processed,
                        succeeded: snap.succeeded,
                        errored: snap.errored,
                        skipped: snap.skipped,
                        total_time_ms: snap.total_time_ms,
                    },
                )
            })
            .collect();

        EngineMetrics {
            requests_total: self.counters.total.load(Ordering::Relaxed),
            requests_errored: self.counters.errored.load(Ordering::Relaxed),
            requests_timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            dictionary_cache: self.repositories.dictionary.cache_metrics(),
            phrase_cache: self.repositories.phrase.cache_metrics(),
            layer_stats,
        }
    }

    #[must_use]
    pub fn get_cache_info(&self) -> Vec<(&'static str, CacheMetricsSnapshot)> {
        vec![
            ("dictionary", self.repositories.dictionary.cache_metrics()),
            ("phrase", self.repositories.phrase.cache_metrics()),
        ]
    }

    /// Clears one bounded cache (or all of them for [`CacheKind::Generic`]).
    /// Rule caches refill transparently on next read; this never touches the
    /// on-disk JSONL files.
    pub fn clear_cache(&self, kind: CacheKind) {
        match kind {
            CacheKind::Words => self.repositories.dictionary.clear_cache(),
            CacheKind::Phrases => self.repositories.phrase.clear_cache(),
            CacheKind::Rules => {
                self.repositories.grammar_rules.invalidate();
                self.repositories.word_order_rules.invalidate();
                self.repositories.post_processing_rules.invalidate();
            }
            CacheKind::Generic => {
                self.repositories.dictionary.clear_cache();
                self.repositories.phrase.clear_cache();
                self.repositories.grammar_rules.invalidate();
                self.repositories.word_order_rules.invalidate();
                self.repositories.post_processing_rules.invalidate();
            }
        }
    }

    /// Clears every cache and per-layer statistic; on-disk repositories are
    /// untouched (spec.md §6 administration, supplemented per SPEC_FULL §2).
    pub fn reset(&self) {
        self.clear_cache(CacheKind::Generic);
        self.pipeline.reset_stats();
        self.counters.total.store(0, Ordering::Relaxed);
        self.counters.errored.store(0, Ordering::Relaxed);
        self.counters.timed_out.store(0, Ordering::Relaxed);
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_dictionary(dir: &Path, lang_pair: &str, entries: &[(&str, &str)]) {
        let lang_dir = dir.join(lang_pair);
        std::fs::create_dir_all(&lang_dir).unwrap();
        let mut body = String::new();
        for (source, target) in entries {
            body.push_str(&format!(
                "{{\"source_word\":\"{source}\",\"target_word\":\"{target}\",\"language_pair\":\"{lang_pair}\",\"part_of_speech\":null,\"definition\":null,\"frequency\":500,\"created_at\":\"2024-01-01T00:00:00Z\",\"updated_at\":\"2024-01-01T00:00:00Z\"}}\n"
            ));
        }
        std::fs::write(lang_dir.join("dictionary.jsonl"), body).unwrap();
    }

    #[tokio::test]
    async fn translate_rejects_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::initialize(dir.path(), None).unwrap();
        let result = engine.translate("", "en", "ru", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn translate_runs_dictionary_layer_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_dictionary(dir.path(), "en-ru", &[("hello", "привет"), ("world", "мир")]);
        let engine = Engine::initialize(dir.path(), None).unwrap();
        let result = engine.translate("hello world", "en", "ru", None).await.unwrap();
        assert!(!result.has_error);
        assert_eq!(result.translated_text, "привет мир");
        assert_eq!(result.original_text, "hello world");
    }

    #[tokio::test]
    async fn reset_zeroes_request_counters() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::initialize(dir.path(), None).unwrap();
        let _ = engine.translate("hello", "en", "ru", None).await.unwrap();
        assert_eq!(engine.get_metrics().requests_total, 1);
        engine.reset();
        assert_eq!(engine.get_metrics().requests_total, 0);
    }

    #[tokio::test]
    async fn queue_overflow_when_admission_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = EngineConfig::default();
        cfg.engine.max_pending = Some(0);
        let engine = Engine::initialize(dir.path(), Some(cfg)).unwrap();
        let result = engine.translate("hello", "en", "ru", None).await;
        assert!(matches!(result, Err(EngineError::QueueOverflow { .. })));
    }
}
