//! End-to-end scenarios, literal to spec.md §8.

use glossforge::context::Context;
use glossforge::repository::{DictionaryRepository, PhraseRepository};
use glossforge::storage::FileStorage;
use glossforge::{CacheKind, Engine, EngineConfig};

fn find_layer<'a>(
    layers: &'a [glossforge::model::LayerDebugInfo],
    name: &str,
) -> &'a glossforge::model::LayerDebugInfo {
    layers
        .iter()
        .find(|l| l.layer_name == name)
        .unwrap_or_else(|| panic!("layer '{name}' did not run"))
}

#[tokio::test]
async fn scenario_1_exact_phrase_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let dictionary = DictionaryRepository::new(storage.clone(), 100, std::time::Duration::from_secs(60));
    dictionary.add("hello", "привет", "en-ru", None, None, 500).unwrap();
    dictionary.add("world", "мир", "en-ru", None, None, 475).unwrap();
    let phrases = PhraseRepository::new(storage, 100, std::time::Duration::from_secs(60));
    phrases
        .add("Good morning", "доброе утро", "en-ru", None, None, 95)
        .unwrap();

    let engine = Engine::initialize(dir.path(), None).unwrap();
    let result = engine.translate("Good morning", "en", "ru", None).await.unwrap();

    assert_eq!(result.translated_text, "доброе утро");
    let dictionary_debug = find_layer(&result.layer_results, "dictionary");
    assert!(!dictionary_debug.was_modified, "dictionary should report no-change");
}

#[tokio::test]
async fn scenario_2_dictionary_only_path() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let dictionary = DictionaryRepository::new(storage, 100, std::time::Duration::from_secs(60));
    dictionary.add("hello", "привет", "en-ru", None, None, 500).unwrap();
    dictionary.add("world", "мир", "en-ru", None, None, 475).unwrap();

    let engine = Engine::initialize(dir.path(), None).unwrap();
    let result = engine.translate("hello world", "en", "ru", None).await.unwrap();

    assert_eq!(result.translated_text, "привет мир");
    let phrase_debug = find_layer(&result.layer_results, "phrase");
    assert!(!phrase_debug.was_modified, "phrase layer should report no-change");
}

#[tokio::test]
async fn scenario_3_forced_translation_overrides_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let dictionary = DictionaryRepository::new(storage, 100, std::time::Duration::from_secs(60));
    dictionary.add("cat", "кошка", "en-ru", None, None, 10).unwrap();

    let engine = Engine::initialize(dir.path(), None).unwrap();
    let mut ctx = Context::new("en", "ru");
    ctx.force_translations.insert("cat".to_string(), "КОТ".to_string());
    let result = engine.translate("the cat", "en", "ru", Some(ctx)).await.unwrap();

    assert!(result.translated_text.contains("КОТ"));
}

#[tokio::test]
async fn scenario_4_protected_range_integrity() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let dictionary = DictionaryRepository::new(storage.clone(), 100, std::time::Duration::from_secs(60));
    dictionary.add("morning", "утро", "en-ru", None, None, 5).unwrap();
    dictionary.add("good", "хорошо", "en-ru", None, None, 5).unwrap();
    let phrases = PhraseRepository::new(storage, 100, std::time::Duration::from_secs(60));
    phrases
        .add("good morning", "доброе утро", "en-ru", None, None, 90)
        .unwrap();

    let engine = Engine::initialize(dir.path(), None).unwrap();
    let result = engine
        .translate("Good morning everyone", "en", "ru", None)
        .await
        .unwrap();

    assert!(result.translated_text.starts_with("доброе утро"));
    assert!(result.translated_text.contains("everyone"));
}

#[tokio::test]
async fn scenario_5_grammar_rule_collapses_whitespace() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let dictionary = DictionaryRepository::new(storage, 100, std::time::Duration::from_secs(60));
    dictionary.add("hello", "привет", "en-ru", None, None, 500).unwrap();
    dictionary.add("world", "мир", "en-ru", None, None, 475).unwrap();

    let engine = Engine::initialize(dir.path(), None).unwrap();
    let result = engine.translate("hello   world", "en", "ru", None).await.unwrap();

    let translated_words: Vec<&str> = result.translated_text.split(' ').filter(|s| !s.is_empty()).collect();
    assert_eq!(translated_words, vec!["привет", "мир"]);
    assert!(!result.translated_text.contains("  "));
}

#[tokio::test]
async fn scenario_6_post_processing_quote_substitution() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::initialize(dir.path(), None).unwrap();
    let result = engine.translate("\"test\"", "en", "ru", None).await.unwrap();

    assert_eq!(result.translated_text, "«test»");
}

#[tokio::test]
async fn clear_cache_resets_dictionary_cache_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let dictionary = DictionaryRepository::new(storage, 100, std::time::Duration::from_secs(60));
    dictionary.add("hello", "привет", "en-ru", None, None, 500).unwrap();

    let engine = Engine::initialize(dir.path(), None).unwrap();
    let _ = engine.translate("hello", "en", "ru", None).await.unwrap();
    assert!(engine.dictionary().cache_metrics().total_count > 0);
    engine.clear_cache(CacheKind::Words);
    assert_eq!(engine.dictionary().cache_metrics().total_count, 0);
}

#[tokio::test]
async fn config_disables_word_order_layer() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.layers.word_order = false;
    let engine = Engine::initialize(dir.path(), Some(cfg)).unwrap();
    let result = engine.translate("i see the dog", "en", "de", None).await.unwrap();

    assert!(
        !result.layer_results.iter().any(|l| l.layer_name == "word_order"),
        "disabled layer should not appear in layer_results at all"
    );
}
