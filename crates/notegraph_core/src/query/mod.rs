//! Read-side graph queries.
//!
//! # Responsibility
//! - Answer neighbor, traversal, search, stats and connection queries over a
//!   borrowed, consistent view of index + store.
//!
//! # Invariants
//! - Queries never mutate; callers hold the read guard for the whole call.
//! - Every ordering is total, so repeated calls return identical results.

pub mod connections;
pub mod search;
pub mod stats;
pub mod traversal;

use crate::index::entity_index::EntityIndex;
use crate::store::graph_store::GraphStore;

/// Borrowed snapshot the query functions read from.
#[derive(Debug, Clone, Copy)]
pub struct GraphView<'a> {
    pub index: &'a EntityIndex,
    pub store: &'a GraphStore,
}

impl<'a> GraphView<'a> {
    pub fn new(index: &'a EntityIndex, store: &'a GraphStore) -> Self {
        Self { index, store }
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use crate::index::entity_index::EntityIndex;
    use crate::model::edge::{ConnectionType, EdgeKey, ProposedEdge, TextSpan};
    use crate::model::node::{Node, NodeId, PersonNames};
    use crate::store::graph_store::GraphStore;
    use uuid::Uuid;

    pub fn id(value: u128) -> NodeId {
        Uuid::from_u128(value)
    }

    pub fn note(index: &mut EntityIndex, value: u128, title: &str) {
        index.upsert(Node::note(id(value), Some(title.to_string()), 1));
    }

    pub fn person(index: &mut EntityIndex, value: u128, name: &str) {
        index.upsert(Node::person(id(value), &PersonNames::new(name), 1));
    }

    /// Applies `Mentions` edges from note `from` to each `(target, strength)`.
    pub fn mentions(
        index: &EntityIndex,
        store: &mut GraphStore,
        from: u128,
        targets: &[(u128, f64)],
    ) {
        let proposed = targets
            .iter()
            .map(|(target, strength)| ProposedEdge {
                key: EdgeKey::new(id(from), id(*target), ConnectionType::Mentions),
                strength: *strength,
                span: TextSpan::new(0, 1),
            })
            .collect::<Vec<_>>();
        store.apply_diff(index, id(from), &proposed, 1).unwrap();
    }
}
