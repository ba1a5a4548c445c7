//! Connection detector.
//!
//! # Responsibility
//! - Turn note content into proposed `Mentions`/`CoOccursWith` edges.
//!
//! # Invariants
//! - Never fails: empty or unmatched content yields no edges.
//! - Spans are claimed leftmost-longest; a candidate overlapping an already
//!   claimed span is dropped, so each text span names at most one node.
//! - A note never mentions itself.
//! - Output is sorted by edge key and holds one edge per key.

use crate::detect::window::{CoOccurrenceWindow, WindowMap};
use crate::index::entity_index::{Candidate, EntityIndex};
use crate::model::edge::{ConnectionType, EdgeKey, ProposedEdge, TextSpan};
use crate::model::node::{NodeId, NodeKind};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionDetector {
    window: CoOccurrenceWindow,
}

impl ConnectionDetector {
    pub fn new(window: CoOccurrenceWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> CoOccurrenceWindow {
        self.window
    }

    /// Proposes the detected edge set for `note_id` given its `content`.
    pub fn detect(&self, index: &EntityIndex, note_id: NodeId, content: &str) -> Vec<ProposedEdge> {
        let candidates = index
            .find_candidates(content)
            .into_iter()
            .filter(|candidate| candidate.node_id != note_id)
            .collect::<Vec<_>>();
        let claimed = claim_spans(candidates);
        if claimed.is_empty() {
            return Vec::new();
        }

        let mut edges: BTreeMap<EdgeKey, ProposedEdge> = BTreeMap::new();
        for candidate in &claimed {
            let key = EdgeKey::new(note_id, candidate.node_id, ConnectionType::Mentions);
            merge_strongest(&mut edges, key, candidate.strength, candidate.span);
        }

        let people = claimed
            .iter()
            .filter(|candidate| candidate.kind == NodeKind::Person)
            .collect::<Vec<_>>();
        if people.len() > 1 {
            let windows = WindowMap::new(content, self.window);
            for (position, first) in people.iter().enumerate() {
                for second in &people[position + 1..] {
                    if first.node_id == second.node_id
                        || !windows.share_window(&first.span, &second.span)
                    {
                        continue;
                    }
                    let key =
                        EdgeKey::new(first.node_id, second.node_id, ConnectionType::CoOccursWith);
                    let strength = first.strength.min(second.strength);
                    merge_strongest(&mut edges, key, strength, first.span.cover(&second.span));
                }
            }
        }

        edges.into_values().collect()
    }
}

/// Greedy leftmost-longest claiming over candidates already in index order.
fn claim_spans(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut claimed: Vec<Candidate> = Vec::new();
    let mut claimed_until = 0usize;
    for candidate in candidates {
        if !claimed.is_empty() && candidate.span.start < claimed_until {
            continue;
        }
        claimed_until = candidate.span.end;
        claimed.push(candidate);
    }
    claimed
}

/// Keeps the strongest proposal per key; the earliest span wins ties.
fn merge_strongest(
    edges: &mut BTreeMap<EdgeKey, ProposedEdge>,
    key: EdgeKey,
    strength: f64,
    span: TextSpan,
) {
    match edges.get_mut(&key) {
        Some(existing) if strength > existing.strength => {
            existing.strength = strength;
            existing.span = span;
        }
        Some(_) => {}
        None => {
            edges.insert(
                key,
                ProposedEdge {
                    key,
                    strength,
                    span,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionDetector;
    use crate::detect::window::CoOccurrenceWindow;
    use crate::index::entity_index::EntityIndex;
    use crate::model::edge::ConnectionType;
    use crate::model::node::{Node, PersonNames};
    use uuid::Uuid;

    fn index_with_people() -> EntityIndex {
        let mut index = EntityIndex::new(3);
        index.upsert(Node::person(
            Uuid::from_u128(10),
            &PersonNames::new("Alice Smith").with_short_name("Alice"),
            1,
        ));
        index.upsert(Node::person(
            Uuid::from_u128(20),
            &PersonNames::new("Bob Jones"),
            1,
        ));
        index
    }

    #[test]
    fn repeated_mentions_collapse_to_strongest() {
        let index = index_with_people();
        let detector = ConnectionDetector::new(CoOccurrenceWindow::Sentence);
        let note = Uuid::from_u128(1);

        let edges = detector.detect(&index, note, "Alice said hi. Later Alice Smith called.");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key.kind, ConnectionType::Mentions);
        assert_eq!(edges[0].span.start, 21);
    }

    #[test]
    fn contained_short_name_does_not_double_count() {
        let index = index_with_people();
        let detector = ConnectionDetector::new(CoOccurrenceWindow::Sentence);

        let edges = detector.detect(&index, Uuid::from_u128(1), "Alice Smith");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].span.end, 11);
    }

    #[test]
    fn co_occurrence_respects_window() {
        let index = index_with_people();
        let note = Uuid::from_u128(1);

        let sentence = ConnectionDetector::new(CoOccurrenceWindow::Sentence);
        let split = sentence.detect(&index, note, "Alice Smith left. Bob Jones arrived.");
        assert!(split
            .iter()
            .all(|edge| edge.key.kind == ConnectionType::Mentions));

        let paragraph = ConnectionDetector::new(CoOccurrenceWindow::Paragraph);
        let joined = paragraph.detect(&index, note, "Alice Smith left. Bob Jones arrived.");
        let co = joined
            .iter()
            .find(|edge| edge.key.kind == ConnectionType::CoOccursWith)
            .expect("co-occurrence within paragraph");
        assert_eq!(co.key.source, Uuid::from_u128(10));
        assert_eq!(co.key.target, Uuid::from_u128(20));
    }

    #[test]
    fn empty_content_yields_nothing() {
        let index = index_with_people();
        let detector = ConnectionDetector::new(CoOccurrenceWindow::Sentence);
        assert!(detector.detect(&index, Uuid::from_u128(1), "").is_empty());
        assert!(detector
            .detect(&index, Uuid::from_u128(1), "\u{0}\u{fffd} ###")
            .is_empty());
    }

    #[test]
    fn note_does_not_mention_itself() {
        let mut index = index_with_people();
        let note = Uuid::from_u128(1);
        index.upsert(Node::note(note, Some("Weekly sync".to_string()), 1));

        let edges = ConnectionDetector::new(CoOccurrenceWindow::Sentence).detect(
            &index,
            note,
            "Weekly sync\nwith Bob Jones",
        );
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key.target, Uuid::from_u128(20));
    }
}
