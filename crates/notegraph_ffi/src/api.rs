//! FFI graph API for Flutter-facing calls.
//!
//! # Responsibility
//! - Forward note/person events from the desktop shell into the engine.
//! - Expose graph queries as flat, FRB-friendly envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Ids cross the boundary as hyphenated UUID strings.
//! - One engine per process, created lazily on first use.

use notegraph_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    ConnectionType, Edge, EdgeOrigin, ExplicitEdge, GraphConfig, GraphEngine, GraphError, Node,
    NodeId, PersonNames,
};
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;

const CACHE_FILE_NAME: &str = "notegraph_graph.sqlite3";
const ENV_CACHE_PATH: &str = "NOTEGRAPH_CACHE_PATH";
static ENGINE: OnceLock<Result<GraphEngine, String>> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphActionResponse {
    pub ok: bool,
    /// Node the action applied to, when there is one.
    pub node_id: Option<String>,
    /// Stable error code (`not_found`, `conflict`, ...) on failure.
    pub error_code: Option<String>,
    pub message: String,
}

impl GraphActionResponse {
    fn success(message: impl Into<String>, node_id: Option<NodeId>) -> Self {
        Self {
            ok: true,
            node_id: node_id.map(|id| id.to_string()),
            error_code: None,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>, error_code: Option<&str>) -> Self {
        Self {
            ok: false,
            node_id: None,
            error_code: error_code.map(str::to_string),
            message: message.into(),
        }
    }

    fn from_graph_error(operation: &str, err: GraphError) -> Self {
        Self::failure(format!("{operation} failed: {err}"), Some(err.code()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNodeItem {
    pub id: String,
    /// `note|person`.
    pub kind: String,
    pub title: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdgeItem {
    pub source_id: String,
    pub target_id: String,
    /// `mentions|co_occurs_with|explicit_link|assigned_to`.
    pub kind: String,
    pub strength: f64,
    /// `detected|user_declared|imported`.
    pub origin: String,
    pub updated_at: i64,
}

/// Node/edge set for graph views (whole graph or subgraph).
#[derive(Debug, Clone, PartialEq)]
pub struct GraphViewResponse {
    pub ok: bool,
    pub nodes: Vec<GraphNodeItem>,
    pub edges: Vec<GraphEdgeItem>,
    /// Subgraph only: reachable nodes were dropped by the node cap.
    pub truncated: bool,
    pub message: String,
}

impl GraphViewResponse {
    fn failure(message: String) -> Self {
        Self {
            ok: false,
            nodes: Vec::new(),
            edges: Vec::new(),
            truncated: false,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphSearchItem {
    pub node: GraphNodeItem,
    pub strength: f64,
    pub degree: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphSearchResponse {
    pub ok: bool,
    pub items: Vec<GraphSearchItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeTypeCount {
    pub kind: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphStatsResponse {
    pub ok: bool,
    pub node_count: u32,
    pub note_count: u32,
    pub person_count: u32,
    pub edge_count: u32,
    pub edge_count_by_type: Vec<EdgeTypeCount>,
    pub average_degree: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTypeItem {
    pub kind: String,
    pub description: String,
    pub directed: bool,
    pub user_declared: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeConnectionItem {
    pub edge: GraphEdgeItem,
    pub counterpart: GraphNodeItem,
    /// `outgoing|incoming|undirected`.
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphConnectionsResponse {
    pub ok: bool,
    pub items: Vec<NodeConnectionItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphDetectResponse {
    pub ok: bool,
    /// Note version the detection ran against.
    pub version: u64,
    pub added: u32,
    pub updated: u32,
    pub removed: u32,
    pub edges: Vec<GraphEdgeItem>,
    pub message: String,
}

/// User-declared edge requested from Dart.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitEdgeInput {
    pub target_id: String,
    /// `explicit_link|assigned_to`.
    pub kind: String,
    /// Defaults to `1.0`.
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphExportResponse {
    pub ok: bool,
    pub format: String,
    pub payload: String,
    pub message: String,
}

/// Mirrors a note edit; detection runs in the background.
///
/// # FFI contract
/// - Sync call; only updates the index and queues detection.
/// - Stale versions succeed with a message and change nothing.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_note_changed(note_id: String, content: String, version: u64) -> GraphActionResponse {
    let result = with_engine(|engine| {
        let note_id = parse_node_id(&note_id)?;
        engine
            .on_note_changed(note_id, &content, version)
            .map(|change| (note_id, change))
            .map_err(|err| GraphActionResponse::from_graph_error("graph_note_changed", err))
    });
    match result {
        Ok((note_id, change)) => {
            GraphActionResponse::success(format!("{change:?}"), Some(note_id))
        }
        Err(response) => response,
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn graph_note_deleted(note_id: String) -> GraphActionResponse {
    node_action("graph_note_deleted", &note_id, "Note removed.", |engine, id| {
        engine.on_note_deleted(id)
    })
}

/// Mirrors a person create or rename.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_person_changed(
    person_id: String,
    full_name: String,
    short_names: Vec<String>,
    aliases: Vec<String>,
) -> GraphActionResponse {
    let names = PersonNames {
        full_name,
        short_names,
        aliases,
    };
    node_action("graph_person_changed", &person_id, "Person updated.", |engine, id| {
        engine.on_person_changed(id, &names)
    })
}

/// Removes a person and every edge touching it.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_person_deleted(person_id: String) -> GraphActionResponse {
    node_action("graph_person_deleted", &person_id, "Person removed.", |engine, id| {
        engine.on_person_deleted(id)
    })
}

/// Searches node terms; `limit` defaults to the configured search limit.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_search(query: String, limit: Option<u32>) -> GraphSearchResponse {
    let result = with_engine(|engine| {
        engine
            .search(&query, limit.map(i64::from))
            .map_err(|err| format!("graph_search failed: {err}"))
    });
    match result {
        Ok(hits) => {
            let items = hits
                .into_iter()
                .map(|hit| GraphSearchItem {
                    node: to_node_item(&hit.node),
                    strength: hit.strength,
                    degree: saturating_u32(hit.degree),
                })
                .collect::<Vec<_>>();
            let message = if items.is_empty() {
                "No results.".to_string()
            } else {
                format!("Found {} result(s).", items.len())
            };
            GraphSearchResponse {
                ok: true,
                items,
                message,
            }
        }
        Err(message) => GraphSearchResponse {
            ok: false,
            items: Vec::new(),
            message,
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn graph_stats() -> GraphStatsResponse {
    match with_engine(|engine| Ok::<_, String>(engine.get_stats())) {
        Ok(stats) => GraphStatsResponse {
            ok: true,
            node_count: saturating_u32(stats.node_count),
            note_count: saturating_u32(stats.note_count),
            person_count: saturating_u32(stats.person_count),
            edge_count: saturating_u32(stats.edge_count),
            edge_count_by_type: stats
                .edge_count_by_type
                .iter()
                .map(|(kind, count)| EdgeTypeCount {
                    kind: kind.as_str().to_string(),
                    count: saturating_u32(*count),
                })
                .collect(),
            average_degree: stats.average_degree,
            message: String::new(),
        },
        Err(message) => GraphStatsResponse {
            ok: false,
            node_count: 0,
            note_count: 0,
            person_count: 0,
            edge_count: 0,
            edge_count_by_type: Vec::new(),
            average_degree: 0.0,
            message,
        },
    }
}

/// Static connection type catalogue; does not touch the engine.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_connection_types() -> Vec<ConnectionTypeItem> {
    ConnectionType::ALL
        .into_iter()
        .map(|kind| ConnectionTypeItem {
            kind: kind.as_str().to_string(),
            description: kind.description().to_string(),
            directed: kind.is_directed(),
            user_declared: kind.is_user_declared(),
        })
        .collect()
}

#[flutter_rust_bridge::frb(sync)]
pub fn graph_node_connections(node_id: String) -> GraphConnectionsResponse {
    let result = with_engine(|engine| {
        let node_id = parse_node_id(&node_id).map_err(|response| response.message)?;
        engine
            .get_node_connections(node_id)
            .map_err(|err| format!("graph_node_connections failed: {err}"))
    });
    match result {
        Ok(connections) => GraphConnectionsResponse {
            ok: true,
            items: connections
                .iter()
                .map(|connection| NodeConnectionItem {
                    edge: to_edge_item(&connection.edge),
                    counterpart: to_node_item(&connection.counterpart),
                    direction: format!("{:?}", connection.direction).to_ascii_lowercase(),
                })
                .collect(),
            message: String::new(),
        },
        Err(message) => GraphConnectionsResponse {
            ok: false,
            items: Vec::new(),
            message,
        },
    }
}

/// Breadth-first neighborhood of `node_id`.
///
/// `max_nodes` defaults to the configured cap.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_subgraph(node_id: String, depth: i64, max_nodes: Option<i64>) -> GraphViewResponse {
    let result = with_engine(|engine| {
        let node_id = parse_node_id(&node_id).map_err(|response| response.message)?;
        match max_nodes {
            Some(cap) => engine.get_subgraph_bounded(node_id, depth, cap),
            None => engine.get_subgraph(node_id, depth),
        }
        .map_err(|err| format!("graph_subgraph failed: {err}"))
    });
    match result {
        Ok(subgraph) => GraphViewResponse {
            ok: true,
            nodes: subgraph.nodes.iter().map(to_node_item).collect(),
            edges: subgraph.edges.iter().map(to_edge_item).collect(),
            truncated: subgraph.truncated,
            message: String::new(),
        },
        Err(message) => GraphViewResponse::failure(message),
    }
}

/// Entire graph with provenance.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_get() -> GraphViewResponse {
    match with_engine(|engine| Ok::<_, String>(engine.get_graph())) {
        Ok(snapshot) => GraphViewResponse {
            ok: true,
            nodes: snapshot.nodes.iter().map(to_node_item).collect(),
            edges: snapshot.edges.iter().map(to_edge_item).collect(),
            truncated: false,
            message: String::new(),
        },
        Err(message) => GraphViewResponse::failure(message),
    }
}

/// Runs detection for one note before returning.
///
/// # FFI contract
/// - Blocks the calling isolate for the duration of one detection run.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_detect_connections(note_id: String) -> GraphDetectResponse {
    let result = with_engine(|engine| {
        let note_id = parse_node_id(&note_id).map_err(|response| response.message)?;
        engine
            .detect_connections(note_id)
            .map_err(|err| format!("graph_detect_connections failed: {err}"))
    });
    match result {
        Ok(report) => GraphDetectResponse {
            ok: true,
            version: report.version,
            added: saturating_u32(report.summary.added),
            updated: saturating_u32(report.summary.updated),
            removed: saturating_u32(report.summary.removed),
            edges: report.edges.iter().map(to_edge_item).collect(),
            message: String::new(),
        },
        Err(message) => GraphDetectResponse {
            ok: false,
            version: 0,
            added: 0,
            updated: 0,
            removed: 0,
            edges: Vec::new(),
            message,
        },
    }
}

/// Merges user-declared edges from `note_id`; all or nothing.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_update_connections(
    note_id: String,
    edges: Vec<ExplicitEdgeInput>,
) -> GraphActionResponse {
    let result = with_engine(|engine| {
        let note_id = parse_node_id(&note_id)?;
        let requested = edges
            .iter()
            .map(parse_explicit_edge)
            .collect::<Result<Vec<_>, _>>()?;
        engine
            .update_connections(note_id, &requested)
            .map(|stored| (note_id, stored.len()))
            .map_err(|err| GraphActionResponse::from_graph_error("graph_update_connections", err))
    });
    match result {
        Ok((note_id, count)) => GraphActionResponse::success(
            format!("{count} connection(s) declared."),
            Some(note_id),
        ),
        Err(response) => response,
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn graph_remove_connection(
    source_id: String,
    target_id: String,
    kind: String,
) -> GraphActionResponse {
    let result = with_engine(|engine| {
        let source = parse_node_id(&source_id)?;
        let target = parse_node_id(&target_id)?;
        let kind = parse_connection_type(&kind)?;
        engine
            .remove_connection(source, target, kind)
            .map(|removed| (source, removed))
            .map_err(|err| GraphActionResponse::from_graph_error("graph_remove_connection", err))
    });
    match result {
        Ok((source, true)) => GraphActionResponse::success("Connection removed.", Some(source)),
        Ok((source, false)) => GraphActionResponse::success("No such connection.", Some(source)),
        Err(response) => response,
    }
}

/// Renders the graph as `json` or `dot`.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_export(format: String) -> GraphExportResponse {
    let result = with_engine(|engine| {
        engine
            .export_graph(&format)
            .map_err(|err| format!("graph_export failed: {err}"))
    });
    match result {
        Ok(payload) => GraphExportResponse {
            ok: true,
            format: format.trim().to_ascii_lowercase(),
            payload,
            message: String::new(),
        },
        Err(message) => GraphExportResponse {
            ok: false,
            format,
            payload: String::new(),
            message,
        },
    }
}

/// Persists the graph to the process cache file.
#[flutter_rust_bridge::frb(sync)]
pub fn graph_save_cache() -> GraphActionResponse {
    let result = with_engine(|engine| {
        engine
            .save_cache(None)
            .map_err(|err| GraphActionResponse::failure(format!("graph_save_cache failed: {err}"), None))
    });
    match result {
        Ok(()) => GraphActionResponse::success("Graph cache saved.", None),
        Err(response) => response,
    }
}

fn resolve_cache_path() -> PathBuf {
    if let Ok(raw) = std::env::var(ENV_CACHE_PATH) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(CACHE_FILE_NAME)
}

fn engine() -> Result<&'static GraphEngine, String> {
    ENGINE
        .get_or_init(|| {
            let config = GraphConfig::from_env().map_err(|err| err.to_string())?;
            let path = resolve_cache_path();
            GraphEngine::open_with_cache(config, &path).map_err(|err| {
                log::error!(
                    "event=engine_init module=ffi status=error path={} error={}",
                    path.display(),
                    err
                );
                format!("graph engine init failed: {err}")
            })
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Runs `f` against the process engine; init failures map through `E`.
fn with_engine<T, E>(f: impl FnOnce(&GraphEngine) -> Result<T, E>) -> Result<T, E>
where
    E: From<EngineUnavailable>,
{
    let engine = engine().map_err(|message| E::from(EngineUnavailable(message)))?;
    f(engine)
}

struct EngineUnavailable(String);

impl From<EngineUnavailable> for String {
    fn from(value: EngineUnavailable) -> Self {
        value.0
    }
}

impl From<EngineUnavailable> for GraphActionResponse {
    fn from(value: EngineUnavailable) -> Self {
        GraphActionResponse::failure(value.0, Some("engine_unavailable"))
    }
}

fn node_action(
    operation: &str,
    raw_id: &str,
    message: &str,
    f: impl FnOnce(&GraphEngine, NodeId) -> Result<(), GraphError>,
) -> GraphActionResponse {
    let result = with_engine(|engine| {
        let node_id = parse_node_id(raw_id)?;
        f(engine, node_id)
            .map(|()| node_id)
            .map_err(|err| GraphActionResponse::from_graph_error(operation, err))
    });
    match result {
        Ok(node_id) => GraphActionResponse::success(message, Some(node_id)),
        Err(response) => response,
    }
}

fn parse_node_id(raw: &str) -> Result<NodeId, GraphActionResponse> {
    Uuid::parse_str(raw.trim()).map_err(|err| {
        GraphActionResponse::failure(format!("invalid node id `{raw}`: {err}"), Some("invalid_id"))
    })
}

fn parse_connection_type(raw: &str) -> Result<ConnectionType, GraphActionResponse> {
    ConnectionType::parse(raw.trim()).ok_or_else(|| {
        GraphActionResponse::failure(
            format!("unknown connection type `{raw}`"),
            Some("invalid_connection"),
        )
    })
}

fn parse_explicit_edge(input: &ExplicitEdgeInput) -> Result<ExplicitEdge, GraphActionResponse> {
    Ok(ExplicitEdge {
        target: parse_node_id(&input.target_id)?,
        kind: parse_connection_type(&input.kind)?,
        strength: input.strength,
    })
}

fn to_node_item(node: &Node) -> GraphNodeItem {
    GraphNodeItem {
        id: node.id.to_string(),
        kind: node.kind.as_str().to_string(),
        title: node.title.clone(),
        version: node.version,
    }
}

fn to_edge_item(edge: &Edge) -> GraphEdgeItem {
    GraphEdgeItem {
        source_id: edge.source().to_string(),
        target_id: edge.target().to_string(),
        kind: edge.kind().as_str().to_string(),
        strength: edge.strength,
        origin: origin_label(&edge.origin).to_string(),
        updated_at: edge.updated_at,
    }
}

fn origin_label(origin: &EdgeOrigin) -> &'static str {
    match origin {
        EdgeOrigin::Detected { .. } => "detected",
        EdgeOrigin::UserDeclared { .. } => "user_declared",
        EdgeOrigin::Imported => "imported",
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, graph_connection_types, graph_detect_connections, graph_export, graph_get,
        graph_node_connections, graph_note_changed, graph_person_changed, graph_person_deleted,
        graph_remove_connection, graph_search, graph_stats, graph_subgraph,
        graph_update_connections, init_logging, ping, ExplicitEdgeInput,
    };
    use uuid::Uuid;

    fn fresh_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn connection_types_are_listed() {
        let kinds = graph_connection_types()
            .into_iter()
            .map(|item| item.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec!["mentions", "co_occurs_with", "explicit_link", "assigned_to"]
        );
    }

    #[test]
    fn invalid_ids_are_reported_without_panicking() {
        let response = graph_note_changed("not-a-uuid".to_string(), "text".to_string(), 1);
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("invalid_id"));

        assert!(!graph_node_connections("nope".to_string()).ok);
        assert!(!graph_subgraph(fresh_id(), 1, None).ok);
        assert!(!graph_subgraph(fresh_id(), -1, None).ok);
    }

    #[test]
    fn detect_and_query_round_trip() {
        let token = Uuid::new_v4().simple().to_string();
        let person = fresh_id();
        let note = fresh_id();
        let full_name = format!("Zed {token}");

        let created = graph_person_changed(person.clone(), full_name.clone(), vec![], vec![]);
        assert!(created.ok, "{}", created.message);
        let changed = graph_note_changed(
            note.clone(),
            format!("Kickoff {token}\nMet {full_name} today."),
            1,
        );
        assert!(changed.ok, "{}", changed.message);

        let detected = graph_detect_connections(note.clone());
        assert!(detected.ok, "{}", detected.message);
        assert_eq!(detected.version, 1);
        assert_eq!(detected.edges.len(), 1);
        assert_eq!(detected.edges[0].target_id, person);
        assert_eq!(detected.edges[0].kind, "mentions");
        assert_eq!(detected.edges[0].origin, "detected");

        let search = graph_search(full_name.clone(), Some(5));
        assert!(search.items.iter().any(|item| item.node.id == person));

        let connections = graph_node_connections(person.clone());
        assert!(connections.ok);
        assert_eq!(connections.items.len(), 1);
        assert_eq!(connections.items[0].direction, "incoming");

        let view = graph_subgraph(note.clone(), 1, Some(10));
        assert!(view.ok, "{}", view.message);
        assert_eq!(view.nodes.len(), 2);

        let stats = graph_stats();
        assert!(stats.ok);
        assert!(stats.node_count >= 2);
        assert_eq!(stats.edge_count_by_type.len(), 4);
    }

    #[test]
    fn user_declared_edges_follow_person_lifecycle() {
        let person = fresh_id();
        let note = fresh_id();
        assert!(graph_person_changed(person.clone(), "Quinn Ortega".to_string(), vec![], vec![]).ok);
        assert!(graph_note_changed(note.clone(), "Errands".to_string(), 1).ok);

        let declared = graph_update_connections(
            note.clone(),
            vec![ExplicitEdgeInput {
                target_id: person.clone(),
                kind: "assigned_to".to_string(),
                strength: None,
            }],
        );
        assert!(declared.ok, "{}", declared.message);

        let rejected = graph_update_connections(
            note.clone(),
            vec![ExplicitEdgeInput {
                target_id: person.clone(),
                kind: "mentions".to_string(),
                strength: None,
            }],
        );
        assert!(!rejected.ok);
        assert_eq!(rejected.error_code.as_deref(), Some("invalid_connection"));

        assert!(graph_person_deleted(person.clone()).ok);
        assert!(graph_get()
            .edges
            .iter()
            .all(|edge| edge.target_id != person && edge.source_id != person));

        let removal =
            graph_remove_connection(note, person, "assigned_to".to_string());
        assert!(removal.ok);
        assert_eq!(removal.message, "No such connection.");
    }

    #[test]
    fn export_formats() {
        let json = graph_export("json".to_string());
        assert!(json.ok, "{}", json.message);
        let parsed: serde_json::Value = serde_json::from_str(&json.payload).unwrap();
        assert!(parsed.get("nodes").is_some());

        let dot = graph_export(" Dot ".to_string());
        assert!(dot.ok);
        assert_eq!(dot.format, "dot");
        assert!(dot.payload.starts_with("digraph"));

        assert!(!graph_export("xml".to_string()).ok);
    }
}
