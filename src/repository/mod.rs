//! Typed, cache-first, file-backed access to stored entities (spec.md §4.3).

pub mod dictionary;
pub mod phrase;
pub mod rules;
pub mod user_data;

pub use dictionary::DictionaryRepository;
pub use phrase::PhraseRepository;
pub use rules::{GrammarRulesRepository, PostProcessingRulesRepository, WordOrderRulesRepository};
pub use user_data::UserDataRepository;

use crate::cache::CacheMetrics;
use crate::model::CacheMetricsSnapshot;

/// Stable, namespaced cache key shared by every repository.
#[must_use]
pub fn generate_cache_key(namespace: &str, parts: &[&str]) -> String {
    let mut key = String::from(namespace);
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

/// Folds a raw hit/miss counter and the current entry count into the
/// reporting shape surfaced by `Engine::get_metrics()`/`get_cache_info()`.
/// `per_entry_bytes` is a rough estimate (spec.md doesn't mandate exact
/// accounting, only an order-of-magnitude figure for callers).
#[must_use]
pub fn cache_metrics_snapshot(metrics: CacheMetrics, total_count: usize, per_entry_bytes: usize) -> CacheMetricsSnapshot {
    CacheMetricsSnapshot {
        hits: metrics.hits,
        misses: metrics.misses,
        hit_rate: metrics.hit_rate(),
        total_count,
        estimated_memory_bytes: total_count.saturating_mul(per_entry_bytes),
    }
}

fn normalize_language_pair(language_pair: &str) -> String {
    language_pair.trim().to_ascii_lowercase()
}

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
