//! Entity index: canonical registry of graph nodes and their match terms.
//!
//! # Responsibility
//! - Own every `Node` known to the graph.
//! - Answer `find_candidates(text)` for detection and `search_terms(query)`
//!   for search.
//!
//! # Invariants
//! - The cached matcher always reflects the current node set; every mutation
//!   resets it.
//! - Terms shorter than `min_term_chars` are never indexed.

use crate::index::matcher::{term_strength, IndexedTerm, TermMatcher};
use crate::index::text::{is_word_bounded, normalize_term, NormalizedText};
use crate::model::edge::TextSpan;
use crate::model::node::{Node, NodeId, NodeKind};
use std::collections::HashMap;
use std::sync::OnceLock;

const SEARCH_EXACT: f64 = 1.0;
const SEARCH_PREFIX: f64 = 0.8;
const SEARCH_INNER_WORD: f64 = 0.6;

/// Detection candidate with a span in the original text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub span: TextSpan,
    pub strength: f64,
}

/// Best search score of one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermHit {
    pub node_id: NodeId,
    pub strength: f64,
}

#[derive(Debug)]
pub struct EntityIndex {
    nodes: HashMap<NodeId, Node>,
    min_term_chars: usize,
    matcher: OnceLock<TermMatcher>,
}

impl EntityIndex {
    pub fn new(min_term_chars: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            min_term_chars,
            matcher: OnceLock::new(),
        }
    }

    /// Inserts or replaces a node, returning the previous value.
    pub fn upsert(&mut self, node: Node) -> Option<Node> {
        self.matcher = OnceLock::new();
        self.nodes.insert(node.id, node)
    }

    pub fn remove(&mut self, node_id: NodeId) -> Option<Node> {
        let removed = self.nodes.remove(&node_id);
        if removed.is_some() {
            self.matcher = OnceLock::new();
        }
        removed
    }

    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn version_of(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(|node| node.version)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.matcher = OnceLock::new();
    }

    /// Returns every term match in `text`, ordered for span claiming.
    pub fn find_candidates(&self, text: &str) -> Vec<Candidate> {
        let normalized = NormalizedText::new(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let matcher = self
            .matcher
            .get_or_init(|| TermMatcher::new(&self.indexed_terms()));
        matcher
            .find(normalized.as_str())
            .into_iter()
            .filter_map(|found| {
                let span = normalized.original_span(found.start, found.end)?;
                Some(Candidate {
                    node_id: found.node_id,
                    kind: found.node_kind,
                    span,
                    strength: found.strength,
                })
            })
            .collect()
    }

    /// Scores nodes whose terms relate to `query`.
    ///
    /// Scoring per term: exact 1.0, prefix at a word boundary 0.8, later
    /// word-boundary hit 0.6, term contained in the query: term strength.
    /// The result is ordered by strength desc, node id asc.
    pub fn search_terms(&self, query: &str) -> Vec<TermHit> {
        let query = normalize_term(query);
        if query.is_empty() {
            return Vec::new();
        }

        let mut best: HashMap<NodeId, f64> = HashMap::new();
        for term in self.indexed_terms() {
            if let Some(score) = score_search_term(&query, &term) {
                let slot = best.entry(term.node_id).or_insert(0.0);
                *slot = slot.max(score);
            }
        }

        let mut hits = best
            .into_iter()
            .map(|(node_id, strength)| TermHit { node_id, strength })
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        hits
    }

    /// Normalized, length-filtered terms for one node.
    pub fn terms_for(&self, node: &Node) -> Vec<IndexedTerm> {
        node.terms
            .iter()
            .filter_map(|term| {
                let text = normalize_term(&term.text);
                if text.chars().count() < self.min_term_chars {
                    return None;
                }
                let strength = term_strength(&text, term.kind);
                Some(IndexedTerm {
                    node_id: node.id,
                    node_kind: node.kind,
                    text,
                    strength,
                })
            })
            .collect()
    }

    fn indexed_terms(&self) -> Vec<IndexedTerm> {
        let mut terms = self
            .nodes
            .values()
            .flat_map(|node| self.terms_for(node))
            .collect::<Vec<_>>();
        // Stable pattern order keeps automaton construction reproducible.
        terms.sort_by(|a, b| a.text.cmp(&b.text).then_with(|| a.node_id.cmp(&b.node_id)));
        terms
    }
}

fn score_search_term(query: &str, term: &IndexedTerm) -> Option<f64> {
    let text = term.text.as_str();
    if text == query {
        return Some(SEARCH_EXACT);
    }
    if text.starts_with(query) && is_word_bounded(text, 0, query.len()) {
        return Some(SEARCH_PREFIX);
    }
    let inner_hit = text
        .match_indices(query)
        .any(|(start, _)| start > 0 && is_word_bounded(text, start, start + query.len()));
    if inner_hit {
        return Some(SEARCH_INNER_WORD);
    }
    let contained = query
        .match_indices(text)
        .any(|(start, _)| is_word_bounded(query, start, start + text.len()));
    if contained {
        return Some(term.strength);
    }
    None
}
