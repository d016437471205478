//! Rule-driven regex rewrites with a safe built-in fallback (spec.md §4.10).

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::layer::{Layer, LayerPriority, LayerStats, LayerStatsSnapshot};
use crate::model::{GrammarRule, ImpactLevel, LayerDebugInfo, LayerResult, RegexRule};
use crate::regex_util::{apply_replacement, compile_pattern};
use crate::repository::GrammarRulesRepository;

static WHITESPACE_COLLAPSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("whitespace collapse"));

fn fallback_rule() -> GrammarRule {
    GrammarRule {
        rule_id: "builtin:collapse-whitespace".to_string(),
        source_language: "any".to_string(),
        target_language: "any".to_string(),
        description: "Collapse runs of whitespace into a single space".to_string(),
        pattern: r"\s{2,}".to_string(),
        case_sensitive: true,
        replacement: " ".to_string(),
        priority: 0,
        conditions: Vec::new(),
    }
}

fn condition_satisfied(condition: &str, tokens: &[String]) -> bool {
    match condition.strip_prefix("has_token:") {
        Some(needle) => {
            let needle = needle.to_ascii_lowercase();
            tokens.iter().any(|t| t.to_ascii_lowercase().contains(&needle))
        }
        None => true,
    }
}

pub struct GrammarLayer {
    repository: Arc<GrammarRulesRepository>,
    stats: LayerStats,
}

impl GrammarLayer {
    #[must_use]
    pub fn new(repository: Arc<GrammarRulesRepository>) -> Self {
        Self {
            repository,
            stats: LayerStats::new(),
        }
    }
}

impl Layer for GrammarLayer {
    fn name(&self) -> &str {
        "grammar"
    }

    fn description(&self) -> &str {
        "Rule-driven regex rewrites with conjugation/agreement hooks"
    }

    fn priority(&self) -> LayerPriority {
        LayerPriority::Grammar
    }

    fn process(&self, text: &str, context: &mut Context) -> LayerResult {
        let language_pair = context.language_pair();
        let mut rules = self.repository.get_rules(&language_pair).unwrap_or_default();
        if rules.is_empty() {
            rules.push(fallback_rule());
        }

        let tokens = context.tokens.clone().unwrap_or_default();
        let applicable: Vec<&GrammarRule> = rules
            .iter()
            .filter(|r| r.applies_to(&context.source_language, &context.target_language))
            .filter(|r| r.conditions().iter().all(|c| condition_satisfied(c, &tokens)))
            .collect();

        let mut current = text.to_string();
        let mut applied = 0usize;
        for rule in applicable {
            match compile_pattern(rule.pattern(), rule.case_sensitive()) {
                Ok(re) => {
                    let replaced = apply_replacement(&re, &current, rule.replacement());
                    if replaced != current {
                        applied += 1;
                    }
                    current = replaced;
                }
                Err(_) => continue,
            }
        }

        if applied == 0 {
            return LayerResult::no_change(text, LayerDebugInfo::default());
        }

        let debug_info = LayerDebugInfo {
            layer_name: self.name().to_string(),
            is_successful: true,
            items_processed: applied,
            modifications_count: applied,
            impact_level: Some(ImpactLevel::Low.into()),
            was_modified: true,
            ..Default::default()
        };
        LayerResult::success(current, 1.0, debug_info)
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

    #[test]
    fn falls_back_to_whitespace_collapse_when_no_rules_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let repo = GrammarRulesRepository::new(storage, 10, Duration::from_secs(60));
        let layer = GrammarLayer::new(Arc::new(repo));
        let mut ctx = Context::new("en", "ru");
        let result = layer.process("hello   world", &mut ctx);
        assert_eq!(result.processed_text, "hello world");
    }

    #[test]
    fn condition_filters_rules_by_token_presence() {
        assert!(condition_satisfied("has_token:cat", &["the".to_string(), "cat".to_string()]));
        assert!(!condition_satisfied("has_token:dog", &["the".to_string(), "cat".to_string()]));
    }
}
