use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;

use crate::model::{TranslationHistoryEntry, UserSetting, UserTranslationEdit};
use crate::storage::{append_jsonl, read_all_text, read_jsonl, rewrite_jsonl, with_file_lock, FileStorage};

use super::{normalize_language_pair, RepositoryError, RepositoryResult};

const HISTORY_FILE: &str = "translation_history.jsonl";
const SETTINGS_FILE: &str = "user_settings.json";
const EDITS_FILE: &str = "user_translation_edits.jsonl";

pub struct UserDataRepository {
    storage: FileStorage,
}

impl UserDataRepository {
    #[must_use]
    pub fn new(storage: FileStorage) -> Self {
        Self { storage }
    }

    fn history_path(&self) -> PathBuf {
        self.storage.user_file(HISTORY_FILE)
    }

    fn settings_path(&self) -> PathBuf {
        self.storage.user_file(SETTINGS_FILE)
    }

    fn edits_path(&self) -> PathBuf {
        self.storage.user_file(EDITS_FILE)
    }

    /// History is append-only: never rewritten.
    pub fn append_history(&self, entry: &TranslationHistoryEntry) -> RepositoryResult<()> {
        let path = self.history_path();
        with_file_lock(&path, || append_jsonl(&path, entry))?;
        Ok(())
    }

    pub fn get_history(&self, limit: usize) -> RepositoryResult<Vec<TranslationHistoryEntry>> {
        let mut entries: Vec<TranslationHistoryEntry> = read_jsonl(&self.history_path())?;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn get_setting(&self, key: &str) -> RepositoryResult<Option<UserSetting>> {
        Ok(self.load_settings()?.remove(key))
    }

    pub fn set_setting(
        &self,
        key: &str,
        value: serde_json::Value,
        description: Option<String>,
    ) -> RepositoryResult<()> {
        if key.trim().is_empty() {
            return Err(RepositoryError::Validation("empty setting key".into()));
        }
        let path = self.settings_path();
        let now = Utc::now();
        with_file_lock(&path, || {
            let mut settings = self.load_settings_uncached()?;
            let entry = settings.entry(key.to_string()).or_insert_with(|| UserSetting {
                key: key.to_string(),
                value: value.clone(),
                description: description.clone(),
                created_at: now,
                updated_at: now,
            });
            entry.value = value.clone();
            entry.updated_at = now;
            if description.is_some() {
                entry.description = description.clone();
            }
            self.write_settings(&settings)
        })?;
        Ok(())
    }

    fn load_settings_uncached(&self) -> anyhow::Result<HashMap<String, UserSetting>> {
        let path = self.settings_path();
        let text = read_all_text(&path)?;
        if text.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    fn load_settings(&self) -> RepositoryResult<HashMap<String, UserSetting>> {
        Ok(self.load_settings_uncached()?)
    }

    fn write_settings(&self, settings: &HashMap<String, UserSetting>) -> anyhow::Result<()> {
        let path = self.settings_path();
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    pub fn append_edit(&self, edit: &UserTranslationEdit) -> RepositoryResult<()> {
        let path = self.edits_path();
        with_file_lock(&path, || append_jsonl(&path, edit))?;
        Ok(())
    }

    /// Most recent approved edit for this exact text + language pair.
    pub fn find_edit_for_text(
        &self,
        text: &str,
        language_pair: &str,
    ) -> RepositoryResult<Option<UserTranslationEdit>> {
        let lang = normalize_language_pair(language_pair);
        let mut edits: Vec<UserTranslationEdit> = read_jsonl(&self.edits_path())?;
        edits.retain(|e| e.is_approved && e.original_text == text && normalize_language_pair(&e.language_pair) == lang);
        edits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(edits.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn repo() -> (tempfile::TempDir, UserDataRepository) {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        (dir, UserDataRepository::new(storage))
    }

    #[test]
    fn settings_roundtrip() {
        let (_dir, repo) = repo();
        repo.set_setting("theme", serde_json::json!("dark"), Some("ui theme".into()))
            .unwrap();
        let setting = repo.get_setting("theme").unwrap().unwrap();
        assert_eq!(setting.value, serde_json::json!("dark"));
    }

    #[test]
    fn history_append_only_preserves_order() {
        let (_dir, repo) = repo();
        for i in 0..3 {
            repo.append_history(&TranslationHistoryEntry {
                id: None,
                original_text: format!("text {i}"),
                translated_text: format!("trans {i}"),
                language_pair: "en-ru".into(),
                confidence: 0.9,
                processing_time_ms: 10,
                timestamp: Utc::now(),
                session_id: None,
                metadata: serde_json::json!({}),
            })
            .unwrap();
        }
        let history = repo.get_history(10).unwrap();
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn find_edit_returns_most_recent_approved() {
        let (_dir, repo) = repo();
        repo.append_edit(&UserTranslationEdit {
            id: None,
            original_text: "hi".into(),
            original_translation: "привет".into(),
            user_translation: "здравствуй".into(),
            language_pair: "en-ru".into(),
            reason: None,
            is_approved: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .unwrap();
        repo.append_edit(&UserTranslationEdit {
            id: None,
            original_text: "hi".into(),
            original_translation: "привет".into(),
            user_translation: "хай".into(),
            language_pair: "en-ru".into(),
            reason: None,
            is_approved: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .unwrap();
        let found = repo.find_edit_for_text("hi", "en-ru").unwrap().unwrap();
        assert_eq!(found.user_translation, "хай");
    }
}
