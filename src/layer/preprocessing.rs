//! Markup cleanup, Unicode normalization, tokenization, and lightweight
//! script-based language detection (spec.md §4.7).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::layer::{Layer, LayerPriority, LayerStats, LayerStatsSnapshot};
use crate::model::{ImpactLevel, LayerDebugInfo, LayerResult, TextToken, TokenType};

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("html tag regex"));
static NUMERIC_ENTITY_DEC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(\d+);").expect("numeric entity dec regex"));
static NUMERIC_ENTITY_HEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&#x([0-9a-f]+);").expect("numeric entity hex regex"));
static NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&nbsp;", " "),
];

static MD_BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("md bold"));
static MD_ITALIC_STAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("md italic *"));
static MD_ITALIC_US_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([^_]+)_").expect("md italic _"));
static MD_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("md code"));
static MD_STRIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~([^~]+)~").expect("md strike"));
static MD_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("md link"));
static MD_HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s*").expect("md heading"));

static ZERO_WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[​‌‍﻿]").expect("zero width regex"));
static WHITESPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("ws run regex"));

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>()]+").expect("url regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email regex"));
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").expect("hashtag regex"));
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").expect("mention regex"));

/// Runs the URL/email/hashtag/mention matchers in priority order and returns
/// their non-overlapping reserved spans, longest/earliest-registered wins.
fn reserved_spans(text: &str) -> Vec<(usize, usize, TokenType)> {
    let mut spans: Vec<(usize, usize, TokenType)> = Vec::new();
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    let mut consider = |re: &Regex, kind: TokenType, spans: &mut Vec<(usize, usize, TokenType)>, claimed: &mut Vec<(usize, usize)>| {
        for m in re.find_iter(text) {
            let (s, e) = (m.start(), m.end());
            if claimed.iter().any(|&(cs, ce)| s < ce && cs < e) {
                continue;
            }
            claimed.push((s, e));
            spans.push((s, e, kind));
        }
    };

    consider(&URL_RE, TokenType::Url, &mut spans, &mut claimed);
    consider(&EMAIL_RE, TokenType::Email, &mut spans, &mut claimed);
    consider(&HASHTAG_RE, TokenType::Hashtag, &mut spans, &mut claimed);
    consider(&MENTION_RE, TokenType::Mention, &mut spans, &mut claimed);

    spans.sort_by_key(|&(s, _, _)| s);
    spans
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '\''
        || c == '-'
        || c == '_'
        || ('\u{0400}'..='\u{04FF}').contains(&c)
        || ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

fn char_class(c: char) -> TokenType {
    if c == '\n' || c == '\r' {
        TokenType::Newline
    } else if c.is_whitespace() {
        TokenType::Whitespace
    } else if c.is_ascii_digit() {
        TokenType::Number
    } else if is_word_char(c) {
        TokenType::Word
    } else if c.is_ascii_punctuation() {
        TokenType::Punctuation
    } else {
        TokenType::Unknown
    }
}

/// Single linear pass: specialized matchers reserve ranges first, the
/// remainder is classified into non-overlapping word/number/punctuation/
/// whitespace/newline runs (spec.md §4.7).
#[must_use]
pub fn tokenize(text: &str) -> Vec<TextToken> {
    let reserved = reserved_spans(text);
    let mut tokens = Vec::new();
    let mut cursor = 0usize;
    let mut reserved_iter = reserved.into_iter().peekable();

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let (byte_pos, _) = chars[i];

        if let Some(&(rs, re, kind)) = reserved_iter.peek() {
            if byte_pos == rs {
                let original = &text[rs..re];
                tokens.push(TextToken {
                    original: original.to_string(),
                    normalized: original.to_string(),
                    start_position: rs,
                    end_position: re,
                    token_type: kind,
                    confidence: 1.0,
                    metadata: HashMap::new(),
                });
                reserved_iter.next();
                while i < chars.len() && chars[i].0 < re {
                    i += 1;
                }
                cursor = re;
                continue;
            }
        }

        let class = char_class(chars[i].1);
        let start = byte_pos;
        let mut j = i + 1;
        while j < chars.len() {
            let in_reserved = reserved_iter
                .peek()
                .map(|&(rs, _, _)| chars[j].0 == rs)
                .unwrap_or(false);
            if in_reserved || char_class(chars[j].1) != class {
                break;
            }
            j += 1;
        }
        let end = if j < chars.len() { chars[j].0 } else { text.len() };
        let original = &text[start..end];
        tokens.push(TextToken {
            original: original.to_string(),
            normalized: original.to_string(),
            start_position: start,
            end_position: end,
            token_type: class,
            confidence: 1.0,
            metadata: HashMap::new(),
        });
        cursor = end;
        i = j;
    }
    let _ = cursor;
    tokens
}

fn decode_entities(text: &str) -> String {
    let mut out = NUMERIC_ENTITY_DEC_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default()
        })
        .into_owned();
    out = NUMERIC_ENTITY_HEX_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default()
        })
        .into_owned();
    for (entity, replacement) in NAMED_ENTITIES {
        out = out.replace(entity, replacement);
    }
    out
}

fn strip_markdown(text: &str) -> String {
    let mut out = MD_HEADING_RE.replace_all(text, "").into_owned();
    out = MD_LINK_RE.replace_all(&out, "$1").into_owned();
    out = MD_BOLD_RE.replace_all(&out, "$1").into_owned();
    out = MD_ITALIC_STAR_RE.replace_all(&out, "$1").into_owned();
    out = MD_ITALIC_US_RE.replace_all(&out, "$1").into_owned();
    out = MD_CODE_RE.replace_all(&out, "$1").into_owned();
    out = MD_STRIKE_RE.replace_all(&out, "$1").into_owned();
    out
}

fn normalize_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let mapped = match c {
            '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => ' ',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2013}' | '\u{2014}' | '\u{2015}' => '-',
            _ => c,
        };
        out.push(mapped);
    }
    out = out.replace('\u{2026}', "...");
    out = ZERO_WIDTH_RE.replace_all(&out, "").into_owned();
    out
}

/// Runs the full cleanup pipeline: HTML/entities, markdown, unicode
/// normalization, whitespace collapse, trim.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let mut out = HTML_TAG_RE.replace_all(text, "").into_owned();
    out = decode_entities(&out);
    out = strip_markdown(&out);
    out = normalize_unicode(&out);
    out = WHITESPACE_RUN_RE.replace_all(&out, " ").into_owned();
    let lines: Vec<&str> = out.lines().map(str::trim).collect();
    out = lines.join("\n").trim().to_string();
    out
}

fn normalize_number(raw: &str, source_lang: &str) -> String {
    if source_lang.eq_ignore_ascii_case("en") {
        raw.replace(',', "")
    } else {
        raw.replace(',', ".")
    }
}

fn normalize_token(token: &mut TextToken, source_lang: &str) {
    match token.token_type {
        TokenType::Word => token.normalized = token.original.to_ascii_lowercase(),
        TokenType::Number => token.normalized = normalize_number(&token.original, source_lang),
        _ => {}
    }
}

/// Script-based detection used only when the source language is empty or
/// "auto". Returns `None` when indeterminate.
#[must_use]
pub fn detect_language(text: &str) -> Option<String> {
    let mut cyrillic = 0usize;
    let mut cjk = 0usize;
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for c in text.chars() {
        if ('\u{0400}'..='\u{04FF}').contains(&c) {
            cyrillic += 1;
        } else if ('\u{4E00}'..='\u{9FFF}').contains(&c) {
            cjk += 1;
        } else if ('\u{0600}'..='\u{06FF}').contains(&c) {
            arabic += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    let total = cyrillic + cjk + arabic + latin;
    if total == 0 {
        return None;
    }
    if cyrillic * 2 > total {
        return Some("ru".to_string());
    }
    if cjk * 2 > total {
        return Some("zh".to_string());
    }
    if arabic * 2 > total {
        return Some("ar".to_string());
    }
    if latin * 2 > total {
        let lower = text.to_ascii_lowercase();
        if [" der ", " die ", " das ", " und ", " ist "]
            .iter()
            .any(|m| lower.contains(m))
        {
            return Some("de".to_string());
        }
        return Some("en".to_string());
    }
    None
}

pub struct PreprocessingLayer {
    stats: LayerStats,
}

impl Default for PreprocessingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl PreprocessingLayer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: LayerStats::new(),
        }
    }
}

impl Layer for PreprocessingLayer {
    fn name(&self) -> &str {
        "preprocessing"
    }

    fn description(&self) -> &str {
        "Markup cleanup, Unicode normalization, tokenization, language detection"
    }

    fn priority(&self) -> LayerPriority {
        LayerPriority::Preprocessing
    }

    fn can_handle(&self, text: &str, _context: &Context) -> bool {
        !text.is_empty()
    }

    fn process(&self, text: &str, context: &mut Context) -> LayerResult {
        let cleaned = clean_text(text);

        if context.source_language.is_empty() || context.source_language == "auto" {
            if let Some(detected) = detect_language(&cleaned) {
                context.detected_language = Some(detected.clone());
                context.source_language = detected;
            }
        }

        let mut tokens = tokenize(&cleaned);
        for token in &mut tokens {
            normalize_token(token, &context.source_language);
        }

        let word_summary: Vec<String> = tokens
            .iter()
            .filter(|t| t.is_word())
            .map(|t| t.normalized.clone())
            .collect();

        let special_count = tokens
            .iter()
            .filter(|t| matches!(t.token_type, TokenType::Special | TokenType::Unknown))
            .count();
        let ratio_penalty = if tokens.is_empty() {
            0.0
        } else {
            (special_count as f32 / tokens.len() as f32) * 0.3
        };
        let length_penalty = if cleaned.chars().count() < 3 { 0.2 } else { 0.0 };
        let confidence = (1.0f32 - ratio_penalty - length_penalty).clamp(0.0, 1.0);

        context.token_count = Some(tokens.len());
        context.tokens = Some(word_summary);
        context.preprocessing_tokens = Some(tokens.clone());

        let mut debug_info = LayerDebugInfo {
            layer_name: self.name().to_string(),
            is_successful: true,
            items_processed: tokens.len(),
            modifications_count: usize::from(cleaned != text),
            impact_level: Some(if cleaned == text {
                ImpactLevel::None.into()
            } else {
                ImpactLevel::Low.into()
            }),
            was_modified: cleaned != text,
            ..Default::default()
        };
        if context.debug_mode {
            debug_info.input_text = Some(text.to_string());
            debug_info.output_text = Some(cleaned.clone());
        }

        LayerResult::success(cleaned, confidence, debug_info)
    }

    fn stats(&self) -> LayerStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_and_decodes_entities() {
        let out = clean_text("<b>hi &amp; bye</b> &#65; &#x42;");
        assert_eq!(out, "hi & bye A B");
    }

    #[test]
    fn collapses_markdown() {
        let out = clean_text("**bold** and *italic* and `code` and [link](http://x)");
        assert_eq!(out, "bold and italic and code and link");
    }

    #[test]
    fn normalizes_unicode_punctuation() {
        let out = clean_text("\u{201C}hi\u{201D} \u{2014} bye\u{2026}");
        assert_eq!(out, "\"hi\" - bye...");
    }

    #[test]
    fn tokenize_covers_text_without_overlap() {
        let text = "Hello, world! 123";
        let tokens = tokenize(text);
        let mut cursor = 0usize;
        for t in &tokens {
            assert_eq!(t.start_position, cursor);
            assert!(t.end_position > t.start_position);
            cursor = t.end_position;
        }
        assert_eq!(cursor, text.len());
    }

    #[test]
    fn tokenize_recognizes_url_email_hashtag_mention() {
        let tokens = tokenize("see http://example.com or mail me@x.com #topic @user");
        let types: Vec<_> = tokens.iter().map(|t| t.token_type).collect();
        assert!(types.contains(&TokenType::Url));
        assert!(types.contains(&TokenType::Email));
        assert!(types.contains(&TokenType::Hashtag));
        assert!(types.contains(&TokenType::Mention));
    }

    #[test]
    fn detect_language_recognizes_cyrillic() {
        assert_eq!(detect_language("привет мир"), Some("ru".to_string()));
    }

    #[test]
    fn detect_language_recognizes_cjk() {
        assert_eq!(detect_language("你好世界"), Some("zh".to_string()));
    }
}
