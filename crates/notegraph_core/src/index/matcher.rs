//! Pure term matching over normalized text.
//!
//! # Responsibility
//! - Find every boundary-aware occurrence of indexed terms in a text.
//! - Score matches by term specificity.
//!
//! # Invariants
//! - Matching is independent of graph storage: `(text, terms) -> matches`.
//! - Output order is deterministic: start asc, longer span first, Person
//!   before Note, higher strength first, smaller node id first.

use crate::index::text::is_word_bounded;
use crate::model::node::{NodeId, NodeKind, TermKind};
use aho_corasick::{AhoCorasick, MatchKind};
use log::warn;
use std::cmp::Ordering;
use std::collections::HashMap;

/// One normalized term owned by a node.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedTerm {
    pub node_id: NodeId,
    pub node_kind: NodeKind,
    /// Already normalized via `normalize_term`.
    pub text: String,
    pub strength: f64,
}

/// One occurrence of a term in normalized text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermMatch {
    pub node_id: NodeId,
    pub node_kind: NodeKind,
    /// Normalized byte offsets.
    pub start: usize,
    pub end: usize,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy)]
struct TermOwner {
    node_id: NodeId,
    node_kind: NodeKind,
    strength: f64,
}

/// Multi-term matcher backed by one Aho-Corasick automaton.
#[derive(Debug)]
pub struct TermMatcher {
    automaton: Option<AhoCorasick>,
    /// Owners per automaton pattern id.
    owners: Vec<Vec<TermOwner>>,
}

impl TermMatcher {
    pub fn new(terms: &[IndexedTerm]) -> Self {
        let mut patterns: Vec<String> = Vec::new();
        let mut owners: Vec<Vec<TermOwner>> = Vec::new();
        let mut pattern_ids: HashMap<&str, usize> = HashMap::new();

        for term in terms.iter().filter(|term| !term.text.is_empty()) {
            let pattern_id = *pattern_ids.entry(term.text.as_str()).or_insert_with(|| {
                patterns.push(term.text.clone());
                owners.push(Vec::new());
                patterns.len() - 1
            });
            let slot = &mut owners[pattern_id];
            match slot.iter_mut().find(|owner| owner.node_id == term.node_id) {
                Some(owner) => owner.strength = owner.strength.max(term.strength),
                None => slot.push(TermOwner {
                    node_id: term.node_id,
                    node_kind: term.node_kind,
                    strength: term.strength,
                }),
            }
        }

        let automaton = if patterns.is_empty() {
            None
        } else {
            match AhoCorasick::builder()
                .match_kind(MatchKind::Standard)
                .build(&patterns)
            {
                Ok(automaton) => Some(automaton),
                Err(err) => {
                    warn!(
                        "event=matcher_build module=index status=error pattern_count={} error={}",
                        patterns.len(),
                        err
                    );
                    None
                }
            }
        };

        Self { automaton, owners }
    }

    pub fn is_empty(&self) -> bool {
        self.automaton.is_none()
    }

    /// Finds all word-bounded matches in already-normalized `text`.
    pub fn find(&self, text: &str) -> Vec<TermMatch> {
        let Some(automaton) = self.automaton.as_ref() else {
            return Vec::new();
        };

        let mut matches = Vec::new();
        for found in automaton.find_overlapping_iter(text) {
            if !is_word_bounded(text, found.start(), found.end()) {
                continue;
            }
            for owner in &self.owners[found.pattern().as_usize()] {
                matches.push(TermMatch {
                    node_id: owner.node_id,
                    node_kind: owner.node_kind,
                    start: found.start(),
                    end: found.end(),
                    strength: owner.strength,
                });
            }
        }

        matches.sort_by(compare_matches);
        matches
    }
}

/// Convenience wrapper: builds a matcher for `terms` and scans `text`.
pub fn find_term_matches(text: &str, terms: &[IndexedTerm]) -> Vec<TermMatch> {
    TermMatcher::new(terms).find(text)
}

/// Specificity score of a normalized term.
///
/// Longer and multi-word terms score higher so that short common names do
/// not outrank full names.
pub fn term_strength(normalized: &str, kind: TermKind) -> f64 {
    let chars = normalized.chars().count() as f64;
    let words = normalized.split(' ').filter(|word| !word.is_empty()).count() as f64;
    let specificity = 0.3 + 0.04 * chars + 0.15 * (words - 1.0).max(0.0);
    (specificity.min(1.0) * kind.weight()).clamp(0.0, 1.0)
}

/// Total order used for candidate lists.
pub(crate) fn compare_matches(a: &TermMatch, b: &TermMatch) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| b.end.cmp(&a.end))
        .then_with(|| a.node_kind.tie_rank().cmp(&b.node_kind.tie_rank()))
        .then_with(|| b.strength.total_cmp(&a.strength))
        .then_with(|| a.node_id.cmp(&b.node_id))
}

#[cfg(test)]
mod tests {
    use super::{find_term_matches, term_strength, IndexedTerm};
    use crate::model::node::{NodeKind, TermKind};
    use uuid::Uuid;

    fn term(id: u128, kind: NodeKind, text: &str) -> IndexedTerm {
        IndexedTerm {
            node_id: Uuid::from_u128(id),
            node_kind: kind,
            text: text.to_string(),
            strength: term_strength(text, TermKind::Title),
        }
    }

    #[test]
    fn finds_all_bounded_occurrences() {
        let terms = vec![term(1, NodeKind::Person, "alice")];
        let matches = find_term_matches("alice met malice and alice", &terms);
        let starts = matches.iter().map(|m| m.start).collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 21]);
    }

    #[test]
    fn same_span_prefers_person_then_id() {
        let terms = vec![
            term(3, NodeKind::Note, "budget"),
            term(2, NodeKind::Person, "budget"),
            term(1, NodeKind::Note, "budget"),
        ];
        let matches = find_term_matches("the budget", &terms);
        let ids = matches
            .iter()
            .map(|m| m.node_id.as_u128())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn longer_span_sorts_before_contained_span() {
        let terms = vec![
            term(1, NodeKind::Person, "alice"),
            term(2, NodeKind::Person, "alice smith"),
        ];
        let matches = find_term_matches("alice smith", &terms);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].node_id.as_u128(), 2);
        assert_eq!(matches[0].end, 11);
    }

    #[test]
    fn specific_terms_score_higher() {
        let full = term_strength("alice smith", TermKind::FullName);
        let short = term_strength("alice", TermKind::ShortName);
        assert!(full > short);
        assert!((0.0..=1.0).contains(&full));
    }

    #[test]
    fn empty_term_list_matches_nothing() {
        assert!(find_term_matches("anything", &[]).is_empty());
    }
}
