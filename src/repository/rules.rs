use std::time::Duration;

use crate::cache::LruTtlCache;
use crate::model::{GrammarRule, PostProcessingRule, WordOrderRule};
use crate::storage::{read_jsonl, FileStorage};

use super::{generate_cache_key, normalize_language_pair};

macro_rules! rule_repository {
    ($name:ident, $rule:ty, $file:expr, $ns:expr) => {
        pub struct $name {
            storage: FileStorage,
            cache: LruTtlCache<Vec<$rule>>,
        }

        impl $name {
            #[must_use]
            pub fn new(storage: FileStorage, capacity: usize, ttl: Duration) -> Self {
                Self {
                    storage,
                    cache: LruTtlCache::new(capacity, ttl),
                }
            }

            /// Returns rules for this language pair sorted by descending
            /// priority; empty (never an error) when the file is missing.
            pub fn get_rules(&self, language_pair: &str) -> anyhow::Result<Vec<$rule>> {
                let lang = normalize_language_pair(language_pair);
                let key = generate_cache_key($ns, &[&lang]);
                if let Some(hit) = self.cache.get(&key) {
                    return Ok(hit);
                }
                let path = self.storage.language_file(&lang, $file)?;
                let mut rules: Vec<$rule> = read_jsonl(&path)?;
                rules.sort_by(|a, b| b.priority.cmp(&a.priority));
                self.cache.put(key, rules.clone());
                Ok(rules)
            }

            pub fn invalidate(&self) {
                self.cache.clear();
            }
        }
    };
}

rule_repository!(GrammarRulesRepository, GrammarRule, "grammar_rules.jsonl", "grules");
rule_repository!(
    WordOrderRulesRepository,
    WordOrderRule,
    "word_order_rules.jsonl",
    "orules"
);
rule_repository!(
    PostProcessingRulesRepository,
    PostProcessingRule,
    "post_processing_rules.jsonl",
    "prules"
);

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_rules_file_returns_empty() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let repo = GrammarRulesRepository::new(storage, 10, Duration::from_secs(60));
        let rules = repo.get_rules("en-ru").unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn rules_sorted_by_priority_desc() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let path = storage.language_file("en-ru", "grammar_rules.jsonl").unwrap();
        std::fs::write(
            &path,
            concat!(
                r#"{"rule_id":"a","source_language":"any","target_language":"any","description":"","pattern":"x","case_sensitive":false,"replacement":"y","priority":1,"conditions":[]}"#,
                "\n",
                r#"{"rule_id":"b","source_language":"any","target_language":"any","description":"","pattern":"x","case_sensitive":false,"replacement":"y","priority":5,"conditions":[]}"#,
                "\n",
            ),
        )
        .unwrap();
        let repo = GrammarRulesRepository::new(storage, 10, Duration::from_secs(60));
        let rules = repo.get_rules("en-ru").unwrap();
        assert_eq!(rules[0].rule_id, "b");
        assert_eq!(rules[1].rule_id, "a");
    }
}
