//! Adjacency-list graph store.
//!
//! # Responsibility
//! - Hold edges keyed by id and by `(source, target, type)`.
//! - Keep both endpoints' adjacency lists consistent with the edge set.
//! - Replace a note's detected contributions transactionally.
//!
//! # Invariants
//! - An edge id is present in exactly its two endpoints' adjacency lists.
//! - A detected edge exists iff it has at least one contribution, or was
//!   imported without attribution.
//! - An unattributed imported edge sourced at a note does not outlive that
//!   note's next diff unless re-proposed.
//! - `attributions[note]` lists exactly the keys the note contributes to.
//! - Mutations validate everything before the first write, so a rejected call
//!   leaves the store untouched.

use crate::error::{GraphError, GraphResult};
use crate::index::entity_index::EntityIndex;
use crate::model::edge::{
    ConnectionType, Contribution, Edge, EdgeId, EdgeKey, EdgeOrigin, ProposedEdge,
};
use crate::model::node::NodeId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Counts reported by one `apply_diff` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Edges created by this diff.
    pub added: usize,
    /// Existing edges whose contribution from this note changed.
    pub updated: usize,
    /// Contributions withdrawn (edge deleted when none remain).
    pub removed: usize,
    /// Contributions re-proposed with identical data.
    pub unchanged: usize,
}

#[derive(Debug, Default)]
pub struct GraphStore {
    edges: HashMap<EdgeId, Edge>,
    keys: HashMap<EdgeKey, EdgeId>,
    adjacency: HashMap<NodeId, BTreeSet<EdgeId>>,
    attributions: HashMap<NodeId, BTreeSet<EdgeKey>>,
    counts_by_type: BTreeMap<ConnectionType, usize>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edge count per type; every type is present, zero-filled.
    pub fn counts_by_type(&self) -> BTreeMap<ConnectionType, usize> {
        ConnectionType::ALL
            .into_iter()
            .map(|kind| (kind, self.counts_by_type.get(&kind).copied().unwrap_or(0)))
            .collect()
    }

    pub fn get_edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.keys.get(key).and_then(|id| self.edges.get(id))
    }

    /// Incident edges of `node_id`, in edge-id order.
    pub fn edges_of(&self, node_id: NodeId) -> Vec<&Edge> {
        self.adjacency
            .get(&node_id)
            .map(|ids| ids.iter().filter_map(|id| self.edges.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn degree(&self, node_id: NodeId) -> usize {
        self.adjacency.get(&node_id).map_or(0, BTreeSet::len)
    }

    /// Detected edges the note currently contributes to, in key order.
    pub fn attributed_edges(&self, note_id: NodeId) -> Vec<&Edge> {
        self.attributions
            .get(&note_id)
            .map(|keys| keys.iter().filter_map(|key| self.get_edge(key)).collect())
            .unwrap_or_default()
    }

    /// Replaces every detected contribution of `note_id` with `proposed`.
    ///
    /// User-declared edges are never touched.
    ///
    /// # Errors
    /// - `NotFound` when the note or any proposed endpoint is not indexed.
    /// - `InvalidConnection` for user-declared types, self-loops or strengths
    ///   outside `[0, 1]`.
    pub fn apply_diff(
        &mut self,
        index: &EntityIndex,
        note_id: NodeId,
        proposed: &[ProposedEdge],
        now: i64,
    ) -> GraphResult<DiffSummary> {
        if !index.contains(note_id) {
            return Err(GraphError::NotFound(note_id));
        }
        let mut next: BTreeMap<EdgeKey, Contribution> = BTreeMap::new();
        for edge in proposed {
            validate_detected(index, edge)?;
            let contribution = Contribution {
                strength: edge.strength,
                span: edge.span,
            };
            next.entry(edge.key)
                .and_modify(|existing| {
                    if contribution.strength > existing.strength {
                        *existing = contribution;
                    }
                })
                .or_insert(contribution);
        }

        let mut summary = DiffSummary::default();
        let previous = self.attributions.remove(&note_id).unwrap_or_default();
        for key in previous.iter().filter(|key| !next.contains_key(key)) {
            if self.withdraw_contribution(*key, note_id).is_some() {
                summary.removed += 1;
            }
        }
        for key in self.unattributed_imports(note_id, &next) {
            if self.remove_edge(&key).is_some() {
                summary.removed += 1;
            }
        }

        for (key, contribution) in &next {
            match self.keys.get(key).copied() {
                Some(edge_id) => {
                    if self.contribute(edge_id, note_id, *contribution, now) {
                        summary.updated += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                }
                None => {
                    let mut contributions = BTreeMap::new();
                    contributions.insert(note_id, *contribution);
                    self.insert_edge(Edge {
                        id: Uuid::new_v4(),
                        key: *key,
                        strength: contribution.strength,
                        origin: EdgeOrigin::Detected { contributions },
                        created_at: now,
                        updated_at: now,
                    });
                    summary.added += 1;
                }
            }
        }

        if !next.is_empty() {
            self.attributions
                .insert(note_id, next.keys().copied().collect());
        }
        Ok(summary)
    }

    /// Inserts or updates one user-declared edge.
    pub fn upsert_user_edge(
        &mut self,
        index: &EntityIndex,
        key: EdgeKey,
        strength: f64,
        declared_by: NodeId,
        now: i64,
    ) -> GraphResult<Edge> {
        validate_user_edge(index, &key, strength)?;
        if let Some(edge_id) = self.keys.get(&key).copied() {
            if let Some(edge) = self.edges.get_mut(&edge_id) {
                let origin = EdgeOrigin::UserDeclared { declared_by };
                if edge.strength != strength || edge.origin != origin {
                    edge.strength = strength;
                    edge.origin = origin;
                    edge.updated_at = now;
                }
                return Ok(edge.clone());
            }
        }

        let edge = Edge {
            id: Uuid::new_v4(),
            key,
            strength,
            origin: EdgeOrigin::UserDeclared { declared_by },
            created_at: now,
            updated_at: now,
        };
        self.insert_edge(edge.clone());
        Ok(edge)
    }

    /// Validates a user-declared edge without mutating, so batches can be
    /// checked before the first write.
    pub fn check_user_edge(index: &EntityIndex, key: &EdgeKey, strength: f64) -> GraphResult<()> {
        validate_user_edge(index, key, strength)
    }

    /// Removes one user-declared edge; detected keys are refused.
    pub fn remove_user_edge(&mut self, key: &EdgeKey) -> GraphResult<Option<Edge>> {
        if key.kind.is_detected() {
            return Err(GraphError::InvalidConnection {
                kind: key.kind,
                message: "detected connections are removed by re-detection only".to_string(),
            });
        }
        Ok(self.remove_edge(key))
    }

    /// Removes every edge incident to `node_id` and every contribution the
    /// node made as a note. Returns the deleted edges.
    pub fn remove_node(&mut self, node_id: NodeId) -> Vec<Edge> {
        let mut removed = Vec::new();

        if let Some(keys) = self.attributions.remove(&node_id) {
            for key in keys {
                if let Some(edge) = self.withdraw_contribution(key, node_id) {
                    removed.push(edge);
                }
            }
        }

        let incident = self
            .adjacency
            .get(&node_id)
            .map(|ids| ids.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for edge_id in incident {
            let Some(key) = self.edges.get(&edge_id).map(|edge| edge.key) else {
                continue;
            };
            if let Some(edge) = self.remove_edge(&key) {
                removed.push(edge);
            }
        }

        self.adjacency.remove(&node_id);
        removed
    }

    /// Inserts an edge loaded from a cache or export, rebuilding attributions.
    ///
    /// Callers must have verified the endpoints against the index.
    pub fn insert_restored(&mut self, edge: Edge) {
        if let Some(existing) = self.keys.get(&edge.key).copied() {
            self.remove_edge_by_id(existing);
        }
        if let EdgeOrigin::Detected { contributions } = &edge.origin {
            for note_id in contributions.keys() {
                self.attributions
                    .entry(*note_id)
                    .or_default()
                    .insert(edge.key);
            }
        }
        self.insert_edge(edge);
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.keys.clear();
        self.adjacency.clear();
        self.attributions.clear();
        self.counts_by_type.clear();
    }

    fn insert_edge(&mut self, edge: Edge) {
        self.adjacency
            .entry(edge.key.source)
            .or_default()
            .insert(edge.id);
        self.adjacency
            .entry(edge.key.target)
            .or_default()
            .insert(edge.id);
        *self.counts_by_type.entry(edge.key.kind).or_insert(0) += 1;
        self.keys.insert(edge.key, edge.id);
        self.edges.insert(edge.id, edge);
    }

    fn remove_edge(&mut self, key: &EdgeKey) -> Option<Edge> {
        let edge_id = self.keys.get(key).copied()?;
        self.remove_edge_by_id(edge_id)
    }

    fn remove_edge_by_id(&mut self, edge_id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&edge_id)?;
        self.keys.remove(&edge.key);
        if let Some(count) = self.counts_by_type.get_mut(&edge.key.kind) {
            *count = count.saturating_sub(1);
        }
        for endpoint in [edge.key.source, edge.key.target] {
            if let Some(ids) = self.adjacency.get_mut(&endpoint) {
                ids.remove(&edge_id);
                if ids.is_empty() {
                    self.adjacency.remove(&endpoint);
                }
            }
        }
        for contributor in edge.contributors() {
            if let Some(keys) = self.attributions.get_mut(&contributor) {
                keys.remove(&edge.key);
                if keys.is_empty() {
                    self.attributions.remove(&contributor);
                }
            }
        }
        Some(edge)
    }

    /// Drops `note_id`'s contribution; returns the edge if it was deleted.
    fn withdraw_contribution(&mut self, key: EdgeKey, note_id: NodeId) -> Option<Edge> {
        let edge_id = self.keys.get(&key).copied()?;
        let edge = self.edges.get_mut(&edge_id)?;
        let EdgeOrigin::Detected { contributions } = &mut edge.origin else {
            return None;
        };
        contributions.remove(&note_id)?;
        if contributions.is_empty() {
            return self.remove_edge_by_id(edge_id);
        }
        edge.strength = strongest(contributions);
        None
    }

    /// Imported detected-type edges sourced at `note_id` that `next` drops.
    fn unattributed_imports(
        &self,
        note_id: NodeId,
        next: &BTreeMap<EdgeKey, Contribution>,
    ) -> Vec<EdgeKey> {
        self.edges_of(note_id)
            .into_iter()
            .filter(|edge| {
                matches!(edge.origin, EdgeOrigin::Imported)
                    && edge.key.kind.is_detected()
                    && edge.key.source == note_id
                    && !next.contains_key(&edge.key)
            })
            .map(|edge| edge.key)
            .collect()
    }

    /// Records a contribution; returns whether anything observable changed.
    fn contribute(
        &mut self,
        edge_id: EdgeId,
        note_id: NodeId,
        contribution: Contribution,
        now: i64,
    ) -> bool {
        let Some(edge) = self.edges.get_mut(&edge_id) else {
            return false;
        };
        let changed = match &mut edge.origin {
            EdgeOrigin::Detected { contributions } => {
                let previous = contributions.insert(note_id, contribution);
                previous != Some(contribution)
            }
            EdgeOrigin::Imported | EdgeOrigin::UserDeclared { .. } => {
                let mut contributions = BTreeMap::new();
                contributions.insert(note_id, contribution);
                edge.origin = EdgeOrigin::Detected { contributions };
                true
            }
        };
        if changed {
            if let EdgeOrigin::Detected { contributions } = &edge.origin {
                edge.strength = strongest(contributions);
            }
            edge.updated_at = now;
        }
        changed
    }
}

fn strongest(contributions: &BTreeMap<NodeId, Contribution>) -> f64 {
    contributions
        .values()
        .map(|contribution| contribution.strength)
        .fold(0.0, f64::max)
}

fn validate_endpoints(index: &EntityIndex, key: &EdgeKey) -> GraphResult<()> {
    for endpoint in [key.source, key.target] {
        if !index.contains(endpoint) {
            return Err(GraphError::NotFound(endpoint));
        }
    }
    if key.source == key.target {
        return Err(GraphError::InvalidConnection {
            kind: key.kind,
            message: format!("self-connection on {}", key.source),
        });
    }
    Ok(())
}

fn validate_strength(kind: ConnectionType, strength: f64) -> GraphResult<()> {
    if !(0.0..=1.0).contains(&strength) {
        return Err(GraphError::InvalidConnection {
            kind,
            message: format!("strength {strength} outside [0, 1]"),
        });
    }
    Ok(())
}

fn validate_detected(index: &EntityIndex, edge: &ProposedEdge) -> GraphResult<()> {
    if !edge.key.kind.is_detected() {
        return Err(GraphError::InvalidConnection {
            kind: edge.key.kind,
            message: "user-declared types cannot be applied by detection".to_string(),
        });
    }
    validate_endpoints(index, &edge.key)?;
    validate_strength(edge.key.kind, edge.strength)
}

fn validate_user_edge(index: &EntityIndex, key: &EdgeKey, strength: f64) -> GraphResult<()> {
    if !key.kind.is_user_declared() {
        return Err(GraphError::InvalidConnection {
            kind: key.kind,
            message: "detected types cannot be declared explicitly".to_string(),
        });
    }
    validate_endpoints(index, key)?;
    validate_strength(key.kind, strength)
}

#[cfg(test)]
mod tests {
    use super::GraphStore;
    use crate::error::GraphError;
    use crate::index::entity_index::EntityIndex;
    use crate::model::edge::{ConnectionType, Edge, EdgeKey, EdgeOrigin, ProposedEdge, TextSpan};
    use crate::model::node::{Node, NodeId, PersonNames};
    use uuid::Uuid;

    fn id(value: u128) -> NodeId {
        Uuid::from_u128(value)
    }

    fn index() -> EntityIndex {
        let mut index = EntityIndex::new(3);
        for note in [1, 2] {
            index.upsert(Node::note(id(note), Some(format!("note {note}")), 1));
        }
        for (person, name) in [(10, "Alice Smith"), (20, "Bob Jones")] {
            index.upsert(Node::person(id(person), &PersonNames::new(name), 1));
        }
        index
    }

    fn mention(note: u128, target: u128, strength: f64) -> ProposedEdge {
        ProposedEdge {
            key: EdgeKey::new(id(note), id(target), ConnectionType::Mentions),
            strength,
            span: TextSpan::new(0, 5),
        }
    }

    fn co_occurs(strength: f64) -> ProposedEdge {
        ProposedEdge {
            key: EdgeKey::new(id(20), id(10), ConnectionType::CoOccursWith),
            strength,
            span: TextSpan::new(0, 20),
        }
    }

    #[test]
    fn diff_replaces_stale_edges() {
        let index = index();
        let mut store = GraphStore::new();
        store
            .apply_diff(&index, id(1), &[mention(1, 10, 0.9), mention(1, 20, 0.8)], 1)
            .unwrap();
        let summary = store
            .apply_diff(&index, id(1), &[mention(1, 20, 0.8)], 2)
            .unwrap();

        assert_eq!(summary.removed, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.degree(id(10)), 0);
        assert_eq!(store.degree(id(20)), 1);
        assert_eq!(store.counts_by_type()[&ConnectionType::Mentions], 1);
        assert_eq!(store.counts_by_type()[&ConnectionType::AssignedTo], 0);
    }

    #[test]
    fn unchanged_diff_keeps_timestamps() {
        let index = index();
        let mut store = GraphStore::new();
        store.apply_diff(&index, id(1), &[mention(1, 10, 0.9)], 1).unwrap();
        store.apply_diff(&index, id(1), &[mention(1, 10, 0.9)], 50).unwrap();

        let edge = store
            .get_edge(&EdgeKey::new(id(1), id(10), ConnectionType::Mentions))
            .unwrap();
        assert_eq!(edge.updated_at, 1);
    }

    #[test]
    fn shared_co_occurrence_survives_until_last_contributor_leaves() {
        let index = index();
        let mut store = GraphStore::new();
        store.apply_diff(&index, id(1), &[co_occurs(0.5)], 1).unwrap();
        store.apply_diff(&index, id(2), &[co_occurs(0.7)], 1).unwrap();
        let key = EdgeKey::new(id(10), id(20), ConnectionType::CoOccursWith);
        assert_eq!(store.get_edge(&key).unwrap().strength, 0.7);

        store.apply_diff(&index, id(2), &[], 2).unwrap();
        assert_eq!(store.get_edge(&key).unwrap().strength, 0.5);

        store.apply_diff(&index, id(1), &[], 3).unwrap();
        assert!(store.get_edge(&key).is_none());
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn invalid_proposal_leaves_store_untouched() {
        let index = index();
        let mut store = GraphStore::new();
        store.apply_diff(&index, id(1), &[mention(1, 10, 0.9)], 1).unwrap();

        let err = store
            .apply_diff(&index, id(1), &[mention(1, 20, 0.8), mention(1, 99, 0.8)], 2)
            .unwrap_err();
        assert_eq!(err, GraphError::NotFound(id(99)));
        assert_eq!(store.attributed_edges(id(1)).len(), 1);
        assert_eq!(store.attributed_edges(id(1))[0].key.target, id(10));
    }

    #[test]
    fn unattributed_imported_mention_is_dropped_by_next_diff() {
        let index = index();
        let mut store = GraphStore::new();
        let mention_key = EdgeKey::new(id(1), id(10), ConnectionType::Mentions);
        let co_occurrence_key = EdgeKey::new(id(10), id(20), ConnectionType::CoOccursWith);
        for (key, value) in [(mention_key, 1), (co_occurrence_key, 2)] {
            store.insert_restored(Edge {
                id: Uuid::from_u128(100 + value),
                key,
                strength: 0.8,
                origin: EdgeOrigin::Imported,
                created_at: 1,
                updated_at: 1,
            });
        }

        let summary = store.apply_diff(&index, id(1), &[], 2).unwrap();
        assert_eq!(summary.removed, 1);
        assert!(store.get_edge(&mention_key).is_none());
        assert!(store.get_edge(&co_occurrence_key).is_some());
        assert_eq!(store.counts_by_type()[&ConnectionType::Mentions], 0);
    }

    #[test]
    fn reproposed_import_becomes_detected() {
        let index = index();
        let mut store = GraphStore::new();
        let key = EdgeKey::new(id(1), id(10), ConnectionType::Mentions);
        store.insert_restored(Edge {
            id: Uuid::from_u128(100),
            key,
            strength: 0.8,
            origin: EdgeOrigin::Imported,
            created_at: 1,
            updated_at: 1,
        });

        let summary = store.apply_diff(&index, id(1), &[mention(1, 10, 0.9)], 2).unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.removed, 0);
        assert_eq!(store.attributed_edges(id(1)).len(), 1);
        assert_eq!(store.get_edge(&key).unwrap().strength, 0.9);
    }

    #[test]
    fn detection_never_removes_user_edges() {
        let index = index();
        let mut store = GraphStore::new();
        let key = EdgeKey::new(id(1), id(20), ConnectionType::ExplicitLink);
        store.upsert_user_edge(&index, key, 1.0, id(1), 1).unwrap();
        store.apply_diff(&index, id(1), &[mention(1, 10, 0.9)], 2).unwrap();
        store.apply_diff(&index, id(1), &[], 3).unwrap();

        assert!(store.get_edge(&key).is_some());
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn remove_node_cascades_both_sides() {
        let index = index();
        let mut store = GraphStore::new();
        store
            .apply_diff(&index, id(1), &[mention(1, 10, 0.9), co_occurs(0.6)], 1)
            .unwrap();
        store
            .upsert_user_edge(
                &index,
                EdgeKey::new(id(2), id(10), ConnectionType::AssignedTo),
                1.0,
                id(2),
                1,
            )
            .unwrap();

        let removed = store.remove_node(id(10));
        assert_eq!(removed.len(), 3);
        assert_eq!(store.edge_count(), 0);
        assert_eq!(store.degree(id(1)), 0);
        assert_eq!(store.degree(id(2)), 0);
        assert!(store.attributed_edges(id(1)).is_empty());
    }

    #[test]
    fn user_edges_reject_detected_types_and_self_links() {
        let index = index();
        let mut store = GraphStore::new();
        let detected = EdgeKey::new(id(1), id(10), ConnectionType::Mentions);
        assert!(matches!(
            store.upsert_user_edge(&index, detected, 1.0, id(1), 1),
            Err(GraphError::InvalidConnection { .. })
        ));
        let self_link = EdgeKey::new(id(1), id(1), ConnectionType::ExplicitLink);
        assert!(matches!(
            store.upsert_user_edge(&index, self_link, 1.0, id(1), 1),
            Err(GraphError::InvalidConnection { .. })
        ));
    }
}
