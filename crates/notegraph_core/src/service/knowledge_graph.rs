//! Owned knowledge graph service object.
//!
//! # Responsibility
//! - Own the entity index and graph store behind a single `RwLock`.
//! - Route every mutation through validated, atomic write sections.
//! - Expose read queries over a consistent snapshot.
//!
//! # Invariants
//! - Detection runs under the shared read guard; diffs take the write guard
//!   and re-check the node version, so stale results are never applied.
//! - Removing a node removes its edges inside the same write section.
//! - A poisoned lock is recovered; every write section validates before it
//!   mutates, so a panicking reader cannot leave partial state behind.

use crate::config::GraphConfig;
use crate::detect::detector::ConnectionDetector;
use crate::error::{GraphError, GraphResult};
use crate::export::{ExportFormat, GraphExport};
use crate::index::entity_index::EntityIndex;
use crate::index::matcher::TermMatcher;
use crate::index::text::NormalizedText;
use crate::model::edge::{
    ConnectionType, Contribution, Edge, EdgeKey, EdgeOrigin, ExplicitEdge, ProposedEdge,
    TextSpan,
};
use crate::model::node::{Node, NodeId, NodeKind, PersonNames, UNTITLED_NOTE_TITLE};
use crate::model::now_epoch_ms;
use crate::model::snapshot::GraphSnapshot;
use crate::query::connections::{node_connections, NodeConnection};
use crate::query::search::{resolve_limit, search, SearchHit};
use crate::query::stats::{stats, GraphStats};
use crate::query::traversal::{neighbors, subgraph, Neighbor, Subgraph, SubgraphBounds};
use crate::query::GraphView;
use crate::store::graph_store::{DiffSummary, GraphStore};
use log::{info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use uuid::Uuid;

const DEFAULT_USER_EDGE_STRENGTH: f64 = 1.0;

#[derive(Debug)]
struct GraphState {
    index: EntityIndex,
    store: GraphStore,
}

impl GraphState {
    fn view(&self) -> GraphView<'_> {
        GraphView::new(&self.index, &self.store)
    }
}

/// Result of `upsert_node`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// Node as stored, with its assigned version.
    pub node: Node,
    pub previous: Option<Node>,
    /// Title or match terms differ from the previous value (or the node is
    /// new and has terms).
    pub terms_changed: bool,
    /// `false` when an auto-versioned upsert carried nothing new.
    pub changed: bool,
}

/// Result of `remove_node`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub node: Node,
    pub edges: Vec<Edge>,
}

/// Detector output bound to the node version it was computed against.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub note_id: NodeId,
    pub version: u64,
    pub edges: Vec<ProposedEdge>,
}

#[derive(Debug)]
pub struct KnowledgeGraph {
    state: RwLock<GraphState>,
    config: GraphConfig,
    detector: ConnectionDetector,
}

impl KnowledgeGraph {
    /// Creates an empty graph; `config` is expected to be validated.
    pub fn new(config: GraphConfig) -> Self {
        let detector = ConnectionDetector::new(config.co_occurrence_window);
        Self {
            state: RwLock::new(GraphState {
                index: EntityIndex::new(config.min_term_chars),
                store: GraphStore::new(),
            }),
            config,
            detector,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(|poisoned| {
            warn!("event=lock_recover module=graph status=error lock=read");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(|poisoned| {
            warn!("event=lock_recover module=graph status=error lock=write");
            poisoned.into_inner()
        })
    }

    /// Inserts or replaces a node.
    ///
    /// `node.version == 0` assigns the next version and is a no-op when the
    /// title and terms are unchanged. An explicit version must be greater
    /// than the stored one.
    ///
    /// # Errors
    /// - `InvalidNode` for validation failures or a kind change.
    /// - `Conflict` for an explicit version not newer than the stored one.
    pub fn upsert_node(&self, mut node: Node) -> GraphResult<UpsertOutcome> {
        node.validate()
            .map_err(|err| GraphError::InvalidNode(err.to_string()))?;

        let mut state = self.write();
        let previous = state.index.get(node.id).cloned();
        if let Some(existing) = previous.as_ref() {
            if existing.kind != node.kind {
                return Err(GraphError::InvalidNode(format!(
                    "node {} cannot change kind from {} to {}",
                    node.id,
                    existing.kind.as_str(),
                    node.kind.as_str()
                )));
            }
        }

        let terms_changed = match previous.as_ref() {
            Some(existing) => existing.terms_differ(&node),
            None => !node.terms.is_empty(),
        };

        let previous_version = previous.as_ref().map(|existing| existing.version);
        if node.version == 0 {
            if let Some(existing) = previous.as_ref().filter(|_| !terms_changed) {
                return Ok(UpsertOutcome {
                    node: existing.clone(),
                    previous: previous.clone(),
                    terms_changed: false,
                    changed: false,
                });
            }
            node.version = previous_version.map_or(1, |version| version + 1);
        } else if let Some(actual) = previous_version.filter(|actual| node.version <= *actual) {
            return Err(GraphError::Conflict {
                node_id: node.id,
                expected: node.version,
                actual,
            });
        }

        state.index.upsert(node.clone());
        Ok(UpsertOutcome {
            node,
            previous,
            terms_changed,
            changed: true,
        })
    }

    /// Removes a node and all incident edges atomically.
    pub fn remove_node(&self, node_id: NodeId) -> GraphResult<RemovedNode> {
        let started_at = Instant::now();
        let mut state = self.write();
        let node = state
            .index
            .remove(node_id)
            .ok_or(GraphError::NotFound(node_id))?;
        let edges = state.store.remove_node(node_id);
        drop(state);
        info!(
            "event=graph_node_remove module=graph status=ok node_id={} kind={} edges_removed={} duration_ms={}",
            node_id,
            node.kind.as_str(),
            edges.len(),
            started_at.elapsed().as_millis()
        );
        Ok(RemovedNode { node, edges })
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<Node> {
        self.read().index.get(node_id).cloned()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.read().index.contains(node_id)
    }

    pub fn version_of(&self, node_id: NodeId) -> Option<u64> {
        self.read().index.version_of(node_id)
    }

    /// Incident edges of a node.
    pub fn get_edges(&self, node_id: NodeId) -> GraphResult<Vec<Edge>> {
        let state = self.read();
        if !state.index.contains(node_id) {
            return Err(GraphError::NotFound(node_id));
        }
        Ok(state.store.edges_of(node_id).into_iter().cloned().collect())
    }

    /// Detected edges currently supported by `note_id`'s content.
    pub fn attributed_edges(&self, note_id: NodeId) -> Vec<Edge> {
        self.read()
            .store
            .attributed_edges(note_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Notes that have an edge to `node_id`.
    pub fn connected_notes(&self, node_id: NodeId) -> Vec<NodeId> {
        let state = self.read();
        let mut notes = state
            .store
            .edges_of(node_id)
            .into_iter()
            .filter_map(|edge| edge.key.other(node_id))
            .filter(|other| {
                state
                    .index
                    .get(*other)
                    .is_some_and(|node| node.kind == NodeKind::Note)
            })
            .collect::<Vec<_>>();
        notes.sort();
        notes.dedup();
        notes
    }

    /// Ids from `contents` whose text contains any match term of `node`.
    pub fn notes_matching<'a, I>(&self, node: &Node, contents: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = (NodeId, &'a str)>,
    {
        let state = self.read();
        let terms = state.index.terms_for(node);
        if terms.is_empty() {
            return Vec::new();
        }
        let matcher = TermMatcher::new(&terms);
        contents
            .into_iter()
            .filter(|(note_id, _)| *note_id != node.id)
            .filter(|(_, content)| {
                let normalized = NormalizedText::new(content);
                !matcher.find(normalized.as_str()).is_empty()
            })
            .map(|(note_id, _)| note_id)
            .collect()
    }

    /// Runs the detector for `note_id` under the read guard.
    pub fn detect(&self, note_id: NodeId, content: &str) -> GraphResult<Detection> {
        let started_at = Instant::now();
        let state = self.read();
        let note = state
            .index
            .get(note_id)
            .ok_or(GraphError::NotFound(note_id))?;
        if note.kind != NodeKind::Note {
            return Err(GraphError::InvalidNode(format!(
                "detection runs on notes only; {note_id} is a {}",
                note.kind.as_str()
            )));
        }
        let version = note.version;
        let edges = self.detector.detect(&state.index, note_id, content);
        drop(state);
        info!(
            "event=detect_run module=detect status=ok note_id={} version={} proposed={} content_bytes={} duration_ms={}",
            note_id,
            version,
            edges.len(),
            content.len(),
            started_at.elapsed().as_millis()
        );
        Ok(Detection {
            note_id,
            version,
            edges,
        })
    }

    /// Applies a detection result if the note still holds `version`.
    pub fn apply_diff(
        &self,
        note_id: NodeId,
        version: u64,
        edges: &[ProposedEdge],
    ) -> GraphResult<DiffSummary> {
        let started_at = Instant::now();
        let mut state = self.write();
        let actual = state
            .index
            .version_of(note_id)
            .ok_or(GraphError::NotFound(note_id))?;
        if actual != version {
            return Err(GraphError::Conflict {
                node_id: note_id,
                expected: version,
                actual,
            });
        }
        let GraphState { index, store } = &mut *state;
        let summary = store.apply_diff(index, note_id, edges, now_epoch_ms())?;
        drop(state);
        info!(
            "event=graph_diff_apply module=graph status=ok note_id={} version={} added={} updated={} removed={} unchanged={} duration_ms={}",
            note_id,
            version,
            summary.added,
            summary.updated,
            summary.removed,
            summary.unchanged,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Detects and applies in one call; may return `Conflict` if the note
    /// changed in between.
    pub fn detect_and_apply(&self, note_id: NodeId, content: &str) -> GraphResult<DiffSummary> {
        let detection = self.detect(note_id, content)?;
        self.apply_diff(note_id, detection.version, &detection.edges)
    }

    /// Merges user-declared edges from `note_id`; all or nothing.
    ///
    /// `AssignedTo` targets must be people.
    pub fn upsert_user_edges(
        &self,
        note_id: NodeId,
        requested: &[ExplicitEdge],
    ) -> GraphResult<Vec<Edge>> {
        let mut state = self.write();
        let note = state
            .index
            .get(note_id)
            .ok_or(GraphError::NotFound(note_id))?;
        if note.kind != NodeKind::Note {
            return Err(GraphError::InvalidNode(format!(
                "user-declared connections start at a note; {note_id} is a {}",
                note.kind.as_str()
            )));
        }

        let mut planned = Vec::with_capacity(requested.len());
        for edge in requested {
            let key = EdgeKey::new(note_id, edge.target, edge.kind);
            let strength = edge.strength.unwrap_or(DEFAULT_USER_EDGE_STRENGTH);
            GraphStore::check_user_edge(&state.index, &key, strength)?;
            if edge.kind == ConnectionType::AssignedTo
                && state.index.get(edge.target).map(|node| node.kind) != Some(NodeKind::Person)
            {
                return Err(GraphError::InvalidConnection {
                    kind: edge.kind,
                    message: format!("assignee {} is not a person", edge.target),
                });
            }
            planned.push((key, strength));
        }

        let now = now_epoch_ms();
        let GraphState { index, store } = &mut *state;
        planned
            .into_iter()
            .map(|(key, strength)| store.upsert_user_edge(index, key, strength, note_id, now))
            .collect()
    }

    pub fn remove_user_edge(&self, key: EdgeKey) -> GraphResult<Option<Edge>> {
        self.write().store.remove_user_edge(&key)
    }

    pub fn neighbors(
        &self,
        node_id: NodeId,
        type_filter: Option<ConnectionType>,
    ) -> GraphResult<Vec<Neighbor>> {
        neighbors(self.read().view(), node_id, type_filter)
    }

    pub fn subgraph(
        &self,
        root: NodeId,
        depth: i64,
        max_nodes: Option<i64>,
    ) -> GraphResult<Subgraph> {
        let bounds = SubgraphBounds::new(depth, max_nodes, &self.config)?;
        subgraph(self.read().view(), root, bounds)
    }

    pub fn search(&self, query: &str, limit: Option<i64>) -> GraphResult<Vec<SearchHit>> {
        let limit = resolve_limit(limit, &self.config)?;
        Ok(search(self.read().view(), query, limit))
    }

    pub fn stats(&self) -> GraphStats {
        stats(self.read().view())
    }

    pub fn node_connections(&self, node_id: NodeId) -> GraphResult<Vec<NodeConnection>> {
        node_connections(self.read().view(), node_id)
    }

    /// Full node and edge set, with provenance.
    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.read();
        GraphSnapshot::new(
            state.index.nodes().cloned().collect(),
            state.store.edges().cloned().collect(),
        )
    }

    /// Portable export of the whole graph.
    pub fn export(&self, format: ExportFormat) -> GraphResult<String> {
        let started_at = Instant::now();
        let export = {
            let state = self.read();
            GraphExport::from_parts(state.index.nodes(), state.store.edges())
        };
        let rendered = export.render(format)?;
        info!(
            "event=export module=export status=ok format={} nodes={} edges={} duration_ms={}",
            format.as_str(),
            export.nodes.len(),
            export.edges.len(),
            started_at.elapsed().as_millis()
        );
        Ok(rendered)
    }

    /// Portable export of the bounded neighborhood around `root`.
    pub fn export_subgraph(
        &self,
        root: NodeId,
        depth: i64,
        max_nodes: Option<i64>,
        format: ExportFormat,
    ) -> GraphResult<String> {
        let export = GraphExport::from_subgraph(&self.subgraph(root, depth, max_nodes)?);
        let rendered = export.render(format)?;
        info!(
            "event=export module=export status=ok scope=subgraph format={} nodes={} edges={}",
            format.as_str(),
            export.nodes.len(),
            export.edges.len()
        );
        Ok(rendered)
    }

    /// Replaces the whole graph with `snapshot` after validating it.
    pub fn restore(&self, snapshot: GraphSnapshot) -> GraphResult<()> {
        let mut node_ids = HashSet::new();
        for node in &snapshot.nodes {
            node.validate()
                .map_err(|err| GraphError::InvalidNode(err.to_string()))?;
            if !node_ids.insert(node.id) {
                return Err(GraphError::InvalidNode(format!("duplicate node {}", node.id)));
            }
        }
        let mut keys = HashSet::new();
        for edge in &snapshot.edges {
            check_restored_edge(edge, &node_ids)?;
            if !keys.insert(edge.key) {
                return Err(GraphError::InvalidConnection {
                    kind: edge.kind(),
                    message: format!("duplicate edge {} -> {}", edge.source(), edge.target()),
                });
            }
        }

        let mut state = self.write();
        state.index.clear();
        state.store.clear();
        for node in snapshot.nodes {
            state.index.upsert(node);
        }
        for edge in snapshot.edges {
            state.store.insert_restored(edge);
        }
        Ok(())
    }

    /// Loads a portable export into an empty graph.
    ///
    /// `Mentions` edges are attributed to their source note and
    /// `CoOccursWith` edges to every note mentioning both people, so the next
    /// detection of those notes replaces them. A co-occurrence no imported
    /// note accounts for stays unattributed until a person it joins is
    /// removed.
    pub fn import(&self, export: &GraphExport) -> GraphResult<()> {
        if !self.read().index.is_empty() {
            return Err(GraphError::SerializationError(
                "import requires an empty graph".to_string(),
            ));
        }
        let nodes = export
            .nodes
            .iter()
            .map(|node| match node.kind {
                NodeKind::Note => {
                    let title = node.title.trim();
                    let title = (!title.is_empty() && title != UNTITLED_NOTE_TITLE)
                        .then(|| title.to_string());
                    Node::note(node.id, title, 1)
                }
                NodeKind::Person => Node::person(node.id, &PersonNames::new(&node.title), 1),
            })
            .collect::<Vec<_>>();
        let notes = nodes
            .iter()
            .filter(|node| node.kind == NodeKind::Note)
            .map(|node| node.id)
            .collect::<HashSet<_>>();

        let mut mentioned: BTreeMap<NodeId, HashSet<NodeId>> = BTreeMap::new();
        for edge in &export.edges {
            if edge.kind == ConnectionType::Mentions && notes.contains(&edge.source) {
                mentioned.entry(edge.source).or_default().insert(edge.target);
            }
        }

        let now = now_epoch_ms();
        let edges = export
            .edges
            .iter()
            .map(|edge| {
                let contributors: Vec<NodeId> = match edge.kind {
                    ConnectionType::Mentions if notes.contains(&edge.source) => {
                        vec![edge.source]
                    }
                    ConnectionType::CoOccursWith => mentioned
                        .iter()
                        .filter(|(_, targets)| {
                            targets.contains(&edge.source) && targets.contains(&edge.target)
                        })
                        .map(|(note_id, _)| *note_id)
                        .collect(),
                    _ => Vec::new(),
                };
                let origin = if contributors.is_empty() {
                    EdgeOrigin::Imported
                } else {
                    let contribution = Contribution {
                        strength: edge.strength,
                        span: TextSpan::default(),
                    };
                    EdgeOrigin::Detected {
                        contributions: contributors
                            .into_iter()
                            .map(|note_id| (note_id, contribution))
                            .collect(),
                    }
                };
                Edge {
                    id: Uuid::new_v4(),
                    key: edge.key(),
                    strength: edge.strength,
                    origin,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect::<Vec<_>>();
        self.restore(GraphSnapshot::new(nodes, edges))
    }
}

fn check_restored_edge(edge: &Edge, node_ids: &HashSet<NodeId>) -> GraphResult<()> {
    for endpoint in [edge.source(), edge.target()] {
        if !node_ids.contains(&endpoint) {
            return Err(GraphError::NotFound(endpoint));
        }
    }
    if edge.source() == edge.target() || !(0.0..=1.0).contains(&edge.strength) {
        return Err(GraphError::InvalidConnection {
            kind: edge.kind(),
            message: format!("rejected edge {} -> {}", edge.source(), edge.target()),
        });
    }
    if edge.key != EdgeKey::new(edge.source(), edge.target(), edge.kind()) {
        return Err(GraphError::InvalidConnection {
            kind: edge.kind(),
            message: "undirected edge key is not canonical".to_string(),
        });
    }
    Ok(())
}
