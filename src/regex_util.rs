//! Shared regex replacement-template expansion. Rule files mix `$N`, `\N`,
//! and `${N}` backreference syntaxes (spec.md §9); this module normalizes all
//! three to the single syntax `regex::Regex::replace_all` understands
//! (`${N}`), substituting unknown group indices with an empty string.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

static BACKREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(\d+)\}|\$(\d+)|\\(\d+)").expect("backref regex"));

/// Compile a rule's pattern honoring its `case_sensitive` flag.
pub fn compile_pattern(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
}

/// Applies `replacement` to every match of `re` in `text`, expanding `$N`,
/// `\N`, and `${N}` backreferences against that match's captures. Indices
/// beyond the number of capture groups expand to the empty string.
#[must_use]
pub fn apply_replacement(re: &Regex, text: &str, replacement: &str) -> String {
    re.replace_all(text, |caps: &regex::Captures<'_>| expand_template(replacement, caps))
        .into_owned()
}

fn expand_template(replacement: &str, caps: &regex::Captures<'_>) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut last = 0;
    for m in BACKREF_RE.find_iter(replacement) {
        out.push_str(&replacement[last..m.start()]);
        let captured = &BACKREF_RE.captures(&replacement[m.start()..m.end()]).unwrap();
        let idx_str = captured
            .get(1)
            .or_else(|| captured.get(2))
            .or_else(|| captured.get(3))
            .expect("one alternative always matches")
            .as_str();
        if let Ok(idx) = idx_str.parse::<usize>() {
            out.push_str(caps.get(idx).map(|g| g.as_str()).unwrap_or(""));
        }
        last = m.end();
    }
    out.push_str(&replacement[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_dollar_and_backslash_and_braces() {
        let re = Regex::new(r"(\w+)-(\w+)").unwrap();
        assert_eq!(apply_replacement(&re, "foo-bar", "$2 $1"), "bar foo");
        assert_eq!(apply_replacement(&re, "foo-bar", r"\2 \1"), "bar foo");
        assert_eq!(apply_replacement(&re, "foo-bar", "${2}_${1}"), "bar_foo");
    }

    #[test]
    fn unknown_group_index_expands_to_empty() {
        let re = Regex::new(r"(\w+)").unwrap();
        assert_eq!(apply_replacement(&re, "foo", "[$1][$9]"), "[foo][]");
    }

    #[test]
    fn case_sensitive_flag_is_honored() {
        let re = compile_pattern("hello", false).unwrap();
        assert!(re.is_match("HELLO"));
        let re = compile_pattern("hello", true).unwrap();
        assert!(!re.is_match("HELLO"));
    }
}
