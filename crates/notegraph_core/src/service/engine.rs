//! External-interface facade over the knowledge graph.
//!
//! # Responsibility
//! - Consume note/person events and expose the query surface.
//! - Own the update coordinator and the optional on-disk cache.
//!
//! # Invariants
//! - All mutation flows through `KnowledgeGraph`; the engine adds no state of
//!   its own beyond the coordinator and cache handle.
//! - Loading a cache never runs detection; notes are re-detected only when an
//!   event arrives with a newer version (or the cache was produced with a
//!   different detector configuration).

use crate::config::{ConfigError, GraphConfig};
use crate::db::{open_db, DbError};
use crate::error::{GraphError, GraphResult};
use crate::export::ExportFormat;
use crate::model::edge::{ConnectionType, ConnectionTypeInfo, Edge, EdgeKey, ExplicitEdge};
use crate::model::node::{Node, NodeId, PersonNames};
use crate::model::now_epoch_ms;
use crate::model::snapshot::GraphSnapshot;
use crate::query::connections::NodeConnection;
use crate::query::search::SearchHit;
use crate::query::stats::GraphStats;
use crate::query::traversal::{Neighbor, Subgraph};
use crate::repo::graph_cache_repo::{CacheError, GraphCacheRepository, SqliteGraphCacheRepository};
use crate::service::coordinator::{NoteChange, SyncState, UpdateCoordinator};
use crate::service::knowledge_graph::KnowledgeGraph;
use crate::store::graph_store::DiffSummary;
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Startup error for engine construction.
#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
    Cache(CacheError),
    /// Persisted snapshot violates graph invariants.
    Restore(GraphError),
    /// Detection workers could not be spawned.
    Worker(std::io::Error),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Cache(err) => write!(f, "{err}"),
            Self::Restore(err) => write!(f, "cannot restore graph cache: {err}"),
            Self::Worker(err) => write!(f, "cannot start detection workers: {err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Cache(err) => Some(err),
            Self::Restore(err) => Some(err),
            Self::Worker(err) => Some(err),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<CacheError> for EngineError {
    fn from(value: CacheError) -> Self {
        Self::Cache(value)
    }
}

impl From<DbError> for EngineError {
    fn from(value: DbError) -> Self {
        Self::Cache(CacheError::Db(value))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(value: std::io::Error) -> Self {
        Self::Worker(value)
    }
}

/// Outcome of a synchronous `detect_connections` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub note_id: NodeId,
    pub version: u64,
    pub summary: DiffSummary,
    /// Detected edges now attributed to the note, in key order.
    pub edges: Vec<Edge>,
}

/// Cache status reported after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheLoad {
    pub nodes: usize,
    pub edges: usize,
    /// Cached versions may be adopted without re-detection.
    pub trusted: bool,
}

pub struct GraphEngine {
    graph: Arc<KnowledgeGraph>,
    coordinator: UpdateCoordinator,
    cache_path: Option<PathBuf>,
    cache_load: Option<CacheLoad>,
}

impl GraphEngine {
    /// Starts an empty in-memory engine.
    pub fn new(config: GraphConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let graph = Arc::new(KnowledgeGraph::new(config));
        Self::start(graph, None, None)
    }

    /// Starts an engine backed by the cache file at `path`, loading any
    /// snapshot it already holds.
    pub fn open_with_cache(
        config: GraphConfig,
        path: impl AsRef<Path>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let mut conn = open_db(&path)?;
        let cached = SqliteGraphCacheRepository::new(&mut conn).load_snapshot()?;

        let fingerprint = config.detector_fingerprint();
        let trusted = cached.fingerprint.as_deref().map_or(true, |saved| saved == fingerprint);
        if !trusted {
            warn!(
                "event=cache_load module=engine status=skipped reason=fingerprint_mismatch nodes={}",
                cached.snapshot.nodes.len()
            );
        }

        let graph = Arc::new(KnowledgeGraph::new(config));
        let load = CacheLoad {
            nodes: cached.snapshot.nodes.len(),
            edges: cached.snapshot.edges.len(),
            trusted,
        };
        graph
            .restore(cached.snapshot)
            .map_err(EngineError::Restore)?;
        info!(
            "event=cache_load module=engine status=ok nodes={} edges={} trusted={}",
            load.nodes, load.edges, load.trusted
        );
        Self::start(graph, Some(path), Some(load))
    }

    fn start(
        graph: Arc<KnowledgeGraph>,
        cache_path: Option<PathBuf>,
        cache_load: Option<CacheLoad>,
    ) -> Result<Self, EngineError> {
        let trusted = cache_load.map_or(true, |load| load.trusted);
        let workers = graph.config().worker_count;
        let coordinator = UpdateCoordinator::start(Arc::clone(&graph), workers, trusted)?;
        Ok(Self {
            graph,
            coordinator,
            cache_path,
            cache_load,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        self.graph.config()
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    pub fn cache_load(&self) -> Option<CacheLoad> {
        self.cache_load
    }

    pub fn on_note_changed(
        &self,
        note_id: NodeId,
        content: &str,
        version: u64,
    ) -> GraphResult<NoteChange> {
        self.coordinator.note_changed(note_id, content, version)
    }

    pub fn on_note_deleted(&self, note_id: NodeId) -> GraphResult<()> {
        self.coordinator.note_deleted(note_id).map(|_| ())
    }

    pub fn on_person_changed(&self, person_id: NodeId, names: &PersonNames) -> GraphResult<()> {
        self.coordinator.person_changed(person_id, names).map(|_| ())
    }

    /// Deletes a person; every edge touching it, including user-declared
    /// ones, goes with it.
    pub fn on_person_deleted(&self, person_id: NodeId) -> GraphResult<()> {
        self.coordinator.person_deleted(person_id).map(|_| ())
    }

    pub fn get_graph(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    pub fn search(&self, query: &str, limit: Option<i64>) -> GraphResult<Vec<SearchHit>> {
        self.graph.search(query, limit)
    }

    pub fn get_stats(&self) -> GraphStats {
        self.graph.stats()
    }

    pub fn get_connection_types(&self) -> Vec<ConnectionTypeInfo> {
        ConnectionType::ALL.into_iter().map(ConnectionTypeInfo::from).collect()
    }

    pub fn get_node_connections(&self, node_id: NodeId) -> GraphResult<Vec<NodeConnection>> {
        self.graph.node_connections(node_id)
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<Node> {
        self.graph.get_node(node_id)
    }

    pub fn get_edges(&self, node_id: NodeId) -> GraphResult<Vec<Edge>> {
        self.graph.get_edges(node_id)
    }

    /// Adjacent nodes by strength desc, then id asc.
    pub fn neighbors(
        &self,
        node_id: NodeId,
        type_filter: Option<ConnectionType>,
    ) -> GraphResult<Vec<Neighbor>> {
        self.graph.neighbors(node_id, type_filter)
    }

    /// Subgraph around `node_id` with the configured default node cap.
    pub fn get_subgraph(&self, node_id: NodeId, depth: i64) -> GraphResult<Subgraph> {
        self.graph.subgraph(node_id, depth, None)
    }

    pub fn get_subgraph_bounded(
        &self,
        node_id: NodeId,
        depth: i64,
        max_nodes: i64,
    ) -> GraphResult<Subgraph> {
        self.graph.subgraph(node_id, depth, Some(max_nodes))
    }

    /// Detects and applies connections for one note before returning.
    pub fn detect_connections(&self, note_id: NodeId) -> GraphResult<DetectionReport> {
        let run = self.coordinator.detect_now(note_id)?;
        Ok(DetectionReport {
            note_id,
            version: run.version,
            summary: run.summary,
            edges: self.graph.attributed_edges(note_id),
        })
    }

    /// Merges user-declared edges from `note_id`; existing ones not listed
    /// are kept.
    pub fn update_connections(
        &self,
        note_id: NodeId,
        explicit_edges: &[ExplicitEdge],
    ) -> GraphResult<Vec<Edge>> {
        self.graph.upsert_user_edges(note_id, explicit_edges)
    }

    /// Removes one user-declared edge; `Ok(false)` when it did not exist.
    pub fn remove_connection(
        &self,
        source: NodeId,
        target: NodeId,
        kind: ConnectionType,
    ) -> GraphResult<bool> {
        self.graph
            .remove_user_edge(EdgeKey::new(source, target, kind))
            .map(|removed| removed.is_some())
    }

    /// Renders the whole graph; `format` is `json` or `dot`.
    pub fn export_graph(&self, format: &str) -> GraphResult<String> {
        self.graph.export(ExportFormat::parse(format)?)
    }

    /// Renders the neighborhood of `node_id` within `depth` hops.
    pub fn export_subgraph(&self, node_id: NodeId, depth: i64, format: &str) -> GraphResult<String> {
        let format = ExportFormat::parse(format)?;
        self.graph.export_subgraph(node_id, depth, None, format)
    }

    pub fn sync_state(&self, node_id: NodeId) -> Option<SyncState> {
        self.coordinator.sync_state(node_id)
    }

    /// Writes the current graph to `path`, or the cache opened at startup.
    pub fn save_cache(&self, path: Option<&Path>) -> Result<(), CacheError> {
        let Some(path) = path.or(self.cache_path.as_deref()) else {
            return Err(CacheError::InvalidData(
                "no cache path configured".to_string(),
            ));
        };
        let snapshot = self.graph.snapshot();
        let mut conn = open_db(path)?;
        SqliteGraphCacheRepository::new(&mut conn).save_snapshot(
            &snapshot,
            &self.config().detector_fingerprint(),
            now_epoch_ms(),
        )
    }

    pub fn wait_idle(&self) {
        self.coordinator.wait_idle();
    }

    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}
