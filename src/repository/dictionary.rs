use std::time::Duration;

use chrono::Utc;

use crate::cache::LruTtlCache;
use crate::model::DictionaryEntry;
use crate::storage::{read_jsonl, rewrite_jsonl, with_file_lock, FileStorage};

use super::{cache_metrics_snapshot, generate_cache_key, normalize_language_pair, RepositoryError, RepositoryResult};
use crate::model::CacheMetricsSnapshot;

const FILE_NAME: &str = "dictionary.jsonl";
const NAMESPACE: &str = "dict";

#[derive(Clone, Debug, Default)]
pub struct DictionaryStats {
    pub total_entries: usize,
    pub total_frequency: u64,
}

pub struct DictionaryRepository {
    storage: FileStorage,
    cache: LruTtlCache<Vec<DictionaryEntry>>,
}

impl DictionaryRepository {
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

    fn load_all_uncached(&self, language_pair: &str) -> anyhow::Result<Vec<DictionaryEntry>> {
        read_jsonl(&self.file(language_pair)?)
    }

    fn all_cache_key(lang: &str) -> String {
        generate_cache_key(NAMESPACE, &["all", lang])
    }

    fn load_all(&self, language_pair: &str) -> anyhow::Result<Vec<DictionaryEntry>> {
        let lang = normalize_language_pair(language_pair);
        let key = Self::all_cache_key(&lang);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let entries = self.load_all_uncached(&lang)?;
        self.cache.put(key, entries.clone());
        Ok(entries)
    }

    /// Any write can change the highest-frequency match for an arbitrary
    /// word, so a write invalidates the whole cache rather than trying to
    /// track which per-word keys might now be stale.
    fn invalidate(&self, _language_pair: &str) {
        self.cache.clear();
    }

    /// Highest-frequency match for `source_word` (case-insensitive).
    pub fn get(&self, source_word: &str, language_pair: &str) -> RepositoryResult<Option<DictionaryEntry>> {
        self.get_cached(source_word, language_pair, true)
    }

    pub fn get_cached(
        &self,
        source_word: &str,
        language_pair: &str,
        use_cache: bool,
    ) -> RepositoryResult<Option<DictionaryEntry>> {
        let lang = normalize_language_pair(language_pair);
        let word = source_word.trim().to_ascii_lowercase();
        if word.is_empty() {
            return Err(RepositoryError::Validation("empty source word".into()));
        }
        let key = generate_cache_key(NAMESPACE, &["exact", &lang, &word]);
        if use_cache {
            if let Some(hit) = self.cache.get(&key) {
                return Ok(hit.into_iter().next());
            }
        }
        let entries = self.load_all(&lang)?;
        let best = entries
            .into_iter()
            .filter(|e| e.source_word == word)
            .max_by_key(|e| e.frequency);
        if use_cache {
            self.cache.put(key, best.clone().into_iter().collect());
        }
        Ok(best)
    }

    /// Substring match on `source_word`, ordered by `frequency desc, source_word asc`.
    pub fn search(
        &self,
        needle: &str,
        language_pair: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<DictionaryEntry>> {
        let needle = needle.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut matches: Vec<DictionaryEntry> = self
            .load_all(language_pair)?
            .into_iter()
            .filter(|e| e.source_word.contains(&needle))
            .collect();
        matches.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.source_word.cmp(&b.source_word))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Upserts by `(source_word, language_pair)`; on conflict, accumulates
    /// frequency rather than replacing it.
    pub fn add(
        &self,
        source: &str,
        target: &str,
        language_pair: &str,
        part_of_speech: Option<String>,
        definition: Option<String>,
        frequency: u64,
    ) -> RepositoryResult<DictionaryEntry> {
        let source = source.trim();
        let target = target.trim();
        if source.is_empty() || target.is_empty() {
            return Err(RepositoryError::Validation("empty source/target word".into()));
        }
        let lang = normalize_language_pair(language_pair);
        let source_lower = source.to_ascii_lowercase();
        let path = self.file(&lang)?;
        let now = Utc::now();
        let result = with_file_lock(&path, || {
            let mut entries: Vec<DictionaryEntry> = read_jsonl(&path)?;
            let existing = entries
                .iter_mut()
                .find(|e| e.source_word == source_lower && e.language_pair == lang);
            let saved = if let Some(entry) = existing {
                entry.frequency = entry.frequency.saturating_add(frequency.max(1));
                entry.target_word = target.to_string();
                entry.updated_at = now;
                if part_of_speech.is_some() {
                    entry.part_of_speech = part_of_speech.clone();
                }
                if definition.is_some() {
                    entry.definition = definition.clone();
                }
                entry.clone()
            } else {
                let entry = DictionaryEntry {
                    id: None,
                    source_word: source_lower.clone(),
                    target_word: target.to_string(),
                    language_pair: lang.clone(),
                    part_of_speech,
                    definition,
                    frequency: frequency.max(1),
                    created_at: now,
                    updated_at: now,
                };
                entries.push(entry.clone());
                entry
            };
            rewrite_jsonl(&path, &entries)?;
            Ok(saved)
        })?;
        self.invalidate(&lang);
        Ok(result)
    }

    /// Bulk upsert under a single lock acquisition and a single rewrite.
    pub fn add_bulk(
        &self,
        language_pair: &str,
        new_entries: Vec<(String, String, Option<String>, Option<String>, u64)>,
    ) -> RepositoryResult<usize> {
        let lang = normalize_language_pair(language_pair);
        let path = self.file(&lang)?;
        let now = Utc::now();
        let added = with_file_lock(&path, || {
            let mut entries: Vec<DictionaryEntry> = read_jsonl(&path)?;
            let mut count = 0usize;
            for (source, target, pos, def, freq) in new_entries {
                let source = source.trim().to_ascii_lowercase();
                let target = target.trim().to_string();
                if source.is_empty() || target.is_empty() {
                    continue;
                }
                if let Some(existing) = entries
                    .iter_mut()
                    .find(|e| e.source_word == source && e.language_pair == lang)
                {
                    existing.frequency = existing.frequency.saturating_add(freq.max(1));
                    existing.target_word = target;
                    existing.updated_at = now;
                } else {
                    entries.push(DictionaryEntry {
                        id: None,
                        source_word: source,
                        target_word: target,
                        language_pair: lang.clone(),
                        part_of_speech: pos,
                        definition: def,
                        frequency: freq.max(1),
                        created_at: now,
                        updated_at: now,
                    });
                }
                count += 1;
            }
            rewrite_jsonl(&path, &entries)?;
            Ok(count)
        })?;
        self.invalidate(&lang);
        Ok(added)
    }

    pub fn delete(&self, language_pair: &str, source_word: &str) -> RepositoryResult<bool> {
        let lang = normalize_language_pair(language_pair);
        let word = source_word.trim().to_ascii_lowercase();
        let path = self.file(&lang)?;
        let removed = with_file_lock(&path, || {
            let mut entries: Vec<DictionaryEntry> = read_jsonl(&path)?;
            let before = entries.len();
            entries.retain(|e| e.source_word != word);
            let removed = entries.len() != before;
            if removed {
                rewrite_jsonl(&path, &entries)?;
            }
            Ok(removed)
        })?;
        if removed {
            self.invalidate(&lang);
        }
        Ok(removed)
    }

    pub fn get_all(&self, language_pair: &str) -> RepositoryResult<Vec<DictionaryEntry>> {
        Ok(self.load_all(language_pair)?)
    }

    pub fn get_top(&self, language_pair: &str, limit: usize) -> RepositoryResult<Vec<DictionaryEntry>> {
        let mut entries = self.load_all(language_pair)?;
        entries.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn stats(&self, language_pair: &str) -> RepositoryResult<DictionaryStats> {
        let entries = self.load_all(language_pair)?;
        Ok(DictionaryStats {
            total_entries: entries.len(),
            total_frequency: entries.iter().map(|e| e.frequency).sum(),
        })
    }

    #[must_use]
    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        cache_metrics_snapshot(self.cache.metrics(), self.cache.len(), 64)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn repo() -> (tempfile::TempDir, DictionaryRepository) {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let repo = DictionaryRepository::new(storage, 100, Duration::from_secs(60));
        (dir, repo)
    }

    #[test]
    fn add_then_get_roundtrips() {
        let (_dir, repo) = repo();
        repo.add("Hello", "привет", "en-ru", None, None, 500).unwrap();
        let entry = repo.get("hello", "en-ru").unwrap().unwrap();
        assert_eq!(entry.target_word, "привет");
        assert_eq!(entry.frequency, 500);
    }

    #[test]
    fn add_accumulates_frequency_on_conflict() {
        let (_dir, repo) = repo();
        repo.add("hello", "привет", "en-ru", None, None, 500).unwrap();
        repo.add("hello", "привет", "en-ru", None, None, 10).unwrap();
        let entry = repo.get("hello", "en-ru").unwrap().unwrap();
        assert_eq!(entry.frequency, 510);
    }

    #[test]
    fn search_orders_by_frequency_desc_then_word_asc() {
        let (_dir, repo) = repo();
        repo.add("cat", "кот", "en-ru", None, None, 10).unwrap();
        repo.add("catalog", "каталог", "en-ru", None, None, 50).unwrap();
        repo.add("category", "категория", "en-ru", None, None, 50).unwrap();
        let results = repo.search("cat", "en-ru", 10).unwrap();
        assert_eq!(results[0].source_word, "catalog");
        assert_eq!(results[1].source_word, "category");
        assert_eq!(results[2].source_word, "cat");
    }

    #[test]
    fn empty_source_or_target_is_rejected() {
        let (_dir, repo) = repo();
        assert!(repo.add("", "x", "en-ru", None, None, 1).is_err());
        assert!(repo.add("x", "", "en-ru", None, None, 1).is_err());
    }

    #[test]
    fn delete_invalidates_cache() {
        let (_dir, repo) = repo();
        repo.add("hello", "привет", "en-ru", None, None, 1).unwrap();
        assert!(repo.get("hello", "en-ru").unwrap().is_some());
        assert!(repo.delete("en-ru", "hello").unwrap());
        assert!(repo.get("hello", "en-ru").unwrap().is_none());
    }
}
