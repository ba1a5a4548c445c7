//! Text normalization for term matching.
//!
//! # Responsibility
//! - Produce whitespace-collapsed, case-folded text for matching only.
//! - Map normalized byte offsets back to the untouched original content.
//! - Derive note titles from markdown content.
//!
//! # Invariants
//! - Original content is never mutated; callers keep their own copy.
//! - Every byte of the normalized text maps to one original char range.

use crate::model::edge::TextSpan;
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_TITLE_CHARS: usize = 120;

static TITLE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(#{1,6}\s+|>\s*|[-*+]\s+(\[[ xX]\]\s+)?|\d+[.)]\s+)")
        .expect("valid title prefix regex")
});
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("valid link regex"));
static MARKDOWN_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\*_`~]+").expect("valid markdown symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Case-folded, whitespace-collapsed view over original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    /// Original `[start, end)` char range for each normalized byte.
    origin: Vec<(usize, usize)>,
}

impl NormalizedText {
    pub fn new(raw: &str) -> Self {
        let mut text = String::with_capacity(raw.len());
        let mut origin = Vec::with_capacity(raw.len());
        let mut pending_space: Option<(usize, usize)> = None;

        for (start, ch) in raw.char_indices() {
            let end = start + ch.len_utf8();
            if ch.is_whitespace() {
                if pending_space.is_none() && !text.is_empty() {
                    pending_space = Some((start, end));
                }
                continue;
            }
            if let Some(range) = pending_space.take() {
                text.push(' ');
                origin.push(range);
            }
            for folded in ch.to_lowercase() {
                let before = text.len();
                text.push(folded);
                origin.extend(std::iter::repeat((start, end)).take(text.len() - before));
            }
        }

        Self { text, origin }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Maps a normalized byte range back to original byte offsets.
    pub fn original_span(&self, start: usize, end: usize) -> Option<TextSpan> {
        if start >= end || end > self.origin.len() {
            return None;
        }
        Some(TextSpan::new(self.origin[start].0, self.origin[end - 1].1))
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Normalizes a single term for indexing/lookups.
pub fn normalize_term(value: &str) -> String {
    NormalizedText::new(value).into_string()
}

/// Whether `[start, end)` of `text` is delimited by non-word chars.
pub fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map_or(true, |ch| !ch.is_alphanumeric());
    let after_ok = text[end..]
        .chars()
        .next()
        .map_or(true, |ch| !ch.is_alphanumeric());
    before_ok && after_ok
}

/// Derives a note title from the first non-empty markdown line.
///
/// Rules:
/// - heading, quote, list and checkbox markers are stripped;
/// - link/image syntax keeps only its label;
/// - emphasis/code symbols are removed and whitespace collapsed;
/// - result is capped at 120 chars; `None` when nothing remains.
pub fn derive_note_title(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let without_prefix = TITLE_PREFIX_RE.replace(line, "");
        let without_links = MARKDOWN_LINK_RE.replace_all(&without_prefix, "$1");
        let without_symbols = MARKDOWN_SYMBOL_RE.replace_all(&without_links, "");
        let collapsed = WHITESPACE_RE.replace_all(&without_symbols, " ");
        let trimmed = collapsed.trim().trim_end_matches('#').trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.chars().take(MAX_TITLE_CHARS).collect())
        }
    })
}
