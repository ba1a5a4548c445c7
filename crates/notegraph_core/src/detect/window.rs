//! Co-occurrence windowing rules.
//!
//! # Responsibility
//! - Decide whether two matches fall into the same text window.
//!
//! # Invariants
//! - Window boundaries are computed on the original content, in byte offsets.
//! - `Sentence` splits at `.`/`!`/`?` followed by whitespace and at line
//!   breaks; `Paragraph` splits at blank lines; `Chars(n)` compares the char
//!   distance between match starts.

use crate::model::edge::TextSpan;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static SENTENCE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(\s+|$)|\n").expect("valid sentence break regex"));
static PARAGRAPH_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("valid paragraph break regex"));

/// Window used to decide whether two people co-occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoOccurrenceWindow {
    #[default]
    Sentence,
    Paragraph,
    /// Match starts at most `n` chars apart.
    Chars(usize),
}

impl CoOccurrenceWindow {
    /// Parses `sentence`, `paragraph` or `chars:<n>`.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "sentence" => Some(Self::Sentence),
            "paragraph" => Some(Self::Paragraph),
            other => other
                .strip_prefix("chars:")
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|size| *size > 0)
                .map(Self::Chars),
        }
    }
}

impl Display for CoOccurrenceWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sentence => write!(f, "sentence"),
            Self::Paragraph => write!(f, "paragraph"),
            Self::Chars(size) => write!(f, "chars:{size}"),
        }
    }
}

/// Precomputed windows for one piece of content.
#[derive(Debug, Clone)]
pub struct WindowMap<'a> {
    content: &'a str,
    rule: CoOccurrenceWindow,
    /// Start offsets of windows after the first.
    boundaries: Vec<usize>,
}

impl<'a> WindowMap<'a> {
    pub fn new(content: &'a str, rule: CoOccurrenceWindow) -> Self {
        let boundaries = match rule {
            CoOccurrenceWindow::Sentence => break_offsets(&SENTENCE_BREAK_RE, content),
            CoOccurrenceWindow::Paragraph => break_offsets(&PARAGRAPH_BREAK_RE, content),
            CoOccurrenceWindow::Chars(_) => Vec::new(),
        };
        Self {
            content,
            rule,
            boundaries,
        }
    }

    /// Window index of a span, for segment-based rules.
    pub fn segment_of(&self, span: &TextSpan) -> usize {
        self.boundaries.partition_point(|boundary| *boundary <= span.start)
    }

    /// Whether both spans share a window under the configured rule.
    pub fn share_window(&self, a: &TextSpan, b: &TextSpan) -> bool {
        match self.rule {
            CoOccurrenceWindow::Chars(size) => {
                let (first, second) = if a.start <= b.start { (a, b) } else { (b, a) };
                self.content
                    .get(first.start..second.start)
                    .map_or(false, |gap| gap.chars().count() <= size)
            }
            CoOccurrenceWindow::Sentence | CoOccurrenceWindow::Paragraph => {
                self.segment_of(a) == self.segment_of(b)
            }
        }
    }
}

fn break_offsets(pattern: &Regex, content: &str) -> Vec<usize> {
    pattern
        .find_iter(content)
        .map(|found| found.end())
        .filter(|offset| *offset < content.len())
        .collect()
}
