//! Heuristic component detection and reordering to the target language's
//! syntactic order (spec.md §4.11).

use std::sync::Arc;

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::context::Context;
use crate::layer::{Layer, LayerPriority, LayerStats, LayerStatsSnapshot};
use crate::model::{ImpactLevel, LayerDebugInfo, LayerResult, RegexRule};
use crate::regex_util::{apply_replacement, compile_pattern};
use crate::repository::WordOrderRulesRepository;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Category {
    Subject,
    Verb,
    Object,
    Article,
    Preposition,
    Conjunction,
    Adjective,
    Adverb,
    Unknown,
}

static ARTICLES: Lazy<HashSet<&'static str>> = Lazy::new(|| ["a", "an", "the"].into_iter().collect());
static PREPOSITIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "in", "on", "at", "by", "for", "with", "about", "against", "between", "into", "through",
        "during", "before", "after", "above", "below", "to", "from", "up", "down", "of", "off",
        "over", "under",
    ]
    .into_iter()
    .collect()
});
static CONJUNCTIONS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["and", "or", "but", "nor", "so", "yet"].into_iter().collect());
static SUBJECT_PRONOUNS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["i", "you", "he", "she", "it", "we", "they"].into_iter().collect());
static OBJECT_PRONOUNS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["me", "him", "her", "us", "them"].into_iter().collect());
static VERBS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "is", "are", "was", "were", "am", "be", "been", "have", "has", "had", "do", "does", "did",
        "go", "goes", "went", "see", "saw", "give", "gave", "come", "came", "make", "made", "take",
        "took", "eat", "ate", "run", "ran", "read", "write", "wrote", "love", "loved", "like",
        "likes", "want", "wants", "know", "knows", "say", "says", "said", "think", "thinks", "get",
        "gets", "speak", "speaks", "tell", "tells", "work", "works", "play", "plays", "call",
        "calls", "need", "needs", "feel", "feels", "become", "becomes", "leave", "leaves", "put",
        "puts", "mean", "means", "keep", "keeps", "let", "begin", "begins", "show", "shows",
        "hear", "hears",
    ]
    .into_iter()
    .collect()
});

fn classify(word: &str, prev: Option<Category>, is_first: bool) -> Category {
    let lower = word.to_ascii_lowercase();
    if ARTICLES.contains(lower.as_str()) {
        return Category::Article;
    }
    if PREPOSITIONS.contains(lower.as_str()) {
        return Category::Preposition;
    }
    if CONJUNCTIONS.contains(lower.as_str()) {
        return Category::Conjunction;
    }
    if VERBS.contains(lower.as_str()) || lower.ends_with("ing") || (lower.ends_with("ed") && lower.len() > 3) {
        return Category::Verb;
    }
    if OBJECT_PRONOUNS.contains(lower.as_str()) {
        return Category::Object;
    }
    if SUBJECT_PRONOUNS.contains(lower.as_str()) {
        return Category::Subject;
    }
    if matches!(prev, Some(Category::Verb)) {
        return Category::Object;
    }
    if lower.ends_with("ly") {
        return Category::Adverb;
    }
    if lower.ends_with("ful") || lower.ends_with("ous") || lower.ends_with("ive") || lower.ends_with("able") {
        return Category::Adjective;
    }
    if is_first {
        return Category::Subject;
    }
    Category::Unknown
}

struct Component {
    category: Category,
    text: String,
}

fn target_order(target_language: &str) -> &'static str {
    match target_language {
        "de" | "ja" | "ko" | "tr" | "hi" => "SOV",
        "ar" => "VSO",
        _ => "SVO",
    }
}

/// Classifies words, groups core (subject/verb/object) components with their
/// leading article/preposition, and reorders per `order`. Returns `None` when
/// no subject and verb pair can be identified (degrade to no-op).
fn reorder_sentence(sentence: &str, order: &str) -> Option<String> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let mut components: Vec<Component> = Vec::new();
    let mut extras: Vec<String> = Vec::new();
    let mut prefix = String::new();
    let mut prev_category = None;

    for (idx, word) in words.iter().enumerate() {
        let category = classify(word, prev_category, idx == 0);
        prev_category = Some(category);
        match category {
            Category::Article | Category::Preposition => {
                if !prefix.is_empty() {
                    prefix.push(' ');
                }
                prefix.push_str(word);
            }
            Category::Subject | Category::Verb | Category::Object => {
                let text = if prefix.is_empty() {
                    word.to_string()
                } else {
                    format!("{prefix} {word}")
                };
                prefix.clear();
                if let Some(last) = components.last_mut() {
                    if last.category == category {
                        last.text.push(' ');
                        last.text.push_str(&text);
                        continue;
                    }
                }
                components.push(Component { category, text });
            }
            Category::Conjunction | Category::Adjective | Category::Adverb | Category::Unknown => {
                if !prefix.is_empty() {
                    extras.push(std::mem::take(&mut prefix));
                }
                extras.push((*word).to_string());
            }
        }
    }
    if !prefix.is_empty() {
        extras.push(prefix);
    }

    let has_subject = components.iter().any(|c| c.category == Category::Subject);
    let has_verb = components.iter().any(|c| c.category == Category::Verb);
    if !has_subject || !has_verb {
        return None;
    }

    let mut ordered = Vec::new();
    for slot in order.chars() {
        let wanted = match slot {
            'S' => Category::Subject,
            'V' => Category::Verb,
            'O' => Category::Object,
            _ => continue,
        };
        if let Some(component) = components.iter().find(|c| c.category == wanted) {
            ordered.push(component.text.clone());
        }
    }

    ordered.extend(extras);
    Some(ordered.join(" "))
}

struct SplitSentence {
    core: String,
    punctuation: String,
    trailing: String,
}

fn split_sentences(text: &str) -> Vec<SplitSentence> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if c == '.' || c == '!' || c == '?' {
            let core = text[start..pos].to_string();
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j].1, '.' | '!' | '?') {
                j += 1;
            }
            let punct_end = if j < chars.len() { chars[j].0 } else { text.len() };
            let punctuation = text[pos..punct_end].to_string();
            let mut k = j;
            while k < chars.len() && chars[k].1.is_whitespace() {
                k += 1;
            }
            let ws_end = if k < chars.len() { chars[k].0 } else { text.len() };
            let trailing = text[punct_end..ws_end].to_string();
            sentences.push(SplitSentence { core, punctuation, trailing });
            start = ws_end;
            i = k;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        sentences.push(SplitSentence {
            core: text[start..].to_string(),
            punctuation: String::new(),
            trailing: String::new(),
        });
    }
    sentences
}

pub struct WordOrderLayer {
    repository: Arc<WordOrderRulesRepository>,
    stats: LayerStats,
}

impl WordOrderLayer {
    #[must_use]
    pub fn new(repository: Arc<WordOrderRulesRepository>) -> Self {
        Self {
            repository,
            stats: LayerStats::new(),
        }
    }
}

impl Layer for WordOrderLayer {
    fn name(&self) -> &str {
        "word_order"
    }

    fn description(&self) -> &str {
        "Component detection and reordering to the target syntactic order"
    }

    fn priority(&self) -> LayerPriority {
        LayerPriority::WordOrder
    }

    fn can_handle(&self, text: &str, context: &Context) -> bool {
        self.validate_input(text, context) && context.source_language != context.target_language
    }

    fn process(&self, text: &str, context: &mut Context) -> LayerResult {
        let order = target_order(&context.target_language);
        let sentences = split_sentences(text);

        let mut rebuilt = String::with_capacity(text.len());
        let mut reordered_count = 0usize;
        for sentence in &sentences {
            match reorder_sentence(&sentence.core, order) {
                Some(new_core) if new_core != sentence.core => {
                    reordered_count += 1;
                    rebuilt.push_str(&new_core);
                }
                _ => rebuilt.push_str(&sentence.core),
            }
            rebuilt.push_str(&sentence.punctuation);
            rebuilt.push_str(&sentence.trailing);
        }

        let language_pair = context.language_pair();
        let rules = self.repository.get_rules(&language_pair).unwrap_or_default();
        let mut rule_applied = false;
        for rule in rules
            .iter()
            .filter(|r| r.applies_to(&context.source_language, &context.target_language))
        {
            if let Ok(re) = compile_pattern(rule.pattern(), rule.case_sensitive()) {
                let replaced = apply_replacement(&re, &rebuilt, rule.replacement());
                if replaced != rebuilt {
                    rule_applied = true;
                }
                rebuilt = replaced;
            }
        }

        if reordered_count == 0 && !rule_applied {
            return LayerResult::no_change(text, LayerDebugInfo::default());
        }

        let debug_info = LayerDebugInfo {
            layer_name: self.name().to_string(),
            is_successful: true,
            items_processed: sentences.len(),
            modifications_count: reordered_count,
            impact_level: Some(ImpactLevel::Medium.into()),
            was_modified: true,
            ..Default::default()
        };
        LayerResult::success(rebuilt, 0.8, debug_info)
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

    fn layer() -> (tempfile::TempDir, WordOrderLayer) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let repo = WordOrderRulesRepository::new(storage, 10, Duration::from_secs(60));
        (dir, WordOrderLayer::new(Arc::new(repo)))
    }

    #[test]
    fn skips_when_languages_match() {
        let (_dir, layer) = layer();
        let ctx = Context::new("en", "en");
        assert!(!layer.can_handle("the cat runs", &ctx));
    }

    #[test]
    fn degrades_to_no_op_without_subject_and_verb() {
        let (_dir, layer) = layer();
        let mut ctx = Context::new("en", "de");
        let result = layer.process("red blue green", &mut ctx);
        assert!(!result.is_error());
        assert_eq!(result.processed_text, "red blue green");
    }

    #[test]
    fn reorders_svo_to_sov_for_german_target() {
        let (_dir, layer) = layer();
        let mut ctx = Context::new("en", "de");
        let result = layer.process("i see the dog", &mut ctx);
        assert!(result.is_success());
        // subject "i", verb "see", object (with article) "the dog" -> SOV
        assert_eq!(result.processed_text, "i the dog see");
    }
}
