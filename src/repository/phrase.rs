use std::time::Duration;

use chrono::Utc;

use crate::cache::LruTtlCache;
use crate::model::{CacheMetricsSnapshot, PhraseEntry};
use crate::storage::{read_jsonl, rewrite_jsonl, with_file_lock, FileStorage};

use super::{cache_metrics_snapshot, generate_cache_key, normalize_language_pair, RepositoryError, RepositoryResult};

const FILE_NAME: &str = "phrases.jsonl";
const NAMESPACE: &str = "phrase";

/// Lowercased, whitespace-collapsed, trimmed — the canonical key for phrase lookup.
#[must_use]
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .trim()
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct PhraseRepository {
    storage: FileStorage,
    cache: LruTtlCache<Vec<PhraseEntry>>,
}

impl PhraseRepository {
    #[must_use]
    pub fn new(storage: FileStorage, capacity: usize, ttl: Duration) -> Self {
        Self {
            storage,
            cache: LruTtlCache::new(capacity, ttl),
        }
    }

    fn file(&self, language_pair: &str) -> anyhow::Result<std::path::PathBuf> {
        self.storage.language_file(language_pair, FILE_NAME)
    }

    fn all_cache_key(lang: &str) -> String {
        generate_cache_key(NAMESPACE, &["all", lang])
    }

    fn load_all(&self, language_pair: &str) -> anyhow::Result<Vec<PhraseEntry>> {
        let lang = normalize_language_pair(language_pair);
        let key = Self::all_cache_key(&lang);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let entries: Vec<PhraseEntry> = read_jsonl(&self.file(&lang)?)?;
        self.cache.put(key, entries.clone());
        Ok(entries)
    }

    fn invalidate(&self) {
        self.cache.clear();
    }

    /// Exact match after normalization.
    pub fn get_phrase_translation(
        &self,
        phrase: &str,
        language_pair: &str,
    ) -> RepositoryResult<Option<PhraseEntry>> {
        let normalized = normalize_phrase(phrase);
        if normalized.split(' ').count() < 2 {
            return Ok(None);
        }
        let best = self
            .load_all(language_pair)?
            .into_iter()
            .filter(|e| normalize_phrase(&e.source_phrase) == normalized)
            .max_by_key(|e| e.confidence);
        Ok(best)
    }

    pub fn get_by_category(
        &self,
        category: &str,
        language_pair: &str,
    ) -> RepositoryResult<Vec<PhraseEntry>> {
        Ok(self
            .load_all(language_pair)?
            .into_iter()
            .filter(|e| e.category.as_deref() == Some(category))
            .collect())
    }

    pub fn top_confident(
        &self,
        min_confidence: u32,
        language_pair: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<PhraseEntry>> {
        let mut entries: Vec<PhraseEntry> = self
            .load_all(language_pair)?
            .into_iter()
            .filter(|e| e.confidence >= min_confidence)
            .collect();
        entries.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn get_categories(&self, language_pair: &str) -> RepositoryResult<Vec<String>> {
        let mut categories: Vec<String> = self
            .load_all(language_pair)?
            .into_iter()
            .filter_map(|e| e.category)
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    pub fn add(
        &self,
        source_phrase: &str,
        target_phrase: &str,
        language_pair: &str,
        category: Option<String>,
        context: Option<String>,
        confidence: u32,
    ) -> RepositoryResult<PhraseEntry> {
        let normalized = normalize_phrase(source_phrase);
        if normalized.split(' ').count() < 2 {
            return Err(RepositoryError::Validation(
                "phrase must contain at least 2 words".into(),
            ));
        }
        if target_phrase.trim().is_empty() {
            return Err(RepositoryError::Validation("empty target phrase".into()));
        }
        let confidence = confidence.min(100);
        let lang = normalize_language_pair(language_pair);
        let path = self.file(&lang)?;
        let now = Utc::now();
        let result = with_file_lock(&path, || {
            let mut entries: Vec<PhraseEntry> = read_jsonl(&path)?;
            let existing = entries
                .iter_mut()
                .find(|e| normalize_phrase(&e.source_phrase) == normalized && e.language_pair == lang);
            let saved = if let Some(entry) = existing {
                entry.frequency = entry.frequency.saturating_add(1);
                entry.target_phrase = target_phrase.to_string();
                entry.confidence = confidence;
                entry.updated_at = now;
                entry.clone()
            } else {
                let entry = PhraseEntry {
                    id: None,
                    source_phrase: normalized.clone(),
                    target_phrase: target_phrase.to_string(),
                    language_pair: lang.clone(),
                    category,
                    context,
                    confidence,
                    frequency: 1,
                    usage_count: 0,
                    created_at: now,
                    updated_at: now,
                };
                entries.push(entry.clone());
                entry
            };
            rewrite_jsonl(&path, &entries)?;
            Ok(saved)
        })?;
        self.invalidate();
        Ok(result)
    }

    #[must_use]
    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        cache_metrics_snapshot(self.cache.metrics(), self.cache.len(), 96)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn repo() -> (tempfile::TempDir, PhraseRepository) {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let repo = PhraseRepository::new(storage, 100, Duration::from_secs(60));
        (dir, repo)
    }

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_phrase("  Good   Morning "), "good morning");
    }

    #[test]
    fn exact_match_after_normalization() {
        let (_dir, repo) = repo();
        repo.add("Good Morning", "доброе утро", "en-ru", None, None, 95)
            .unwrap();
        let hit = repo.get_phrase_translation("good   morning", "en-ru").unwrap();
        assert_eq!(hit.unwrap().target_phrase, "доброе утро");
    }

    #[test]
    fn single_word_phrase_is_rejected() {
        let (_dir, repo) = repo();
        assert!(repo.add("hello", "привет", "en-ru", None, None, 90).is_err());
    }
}
