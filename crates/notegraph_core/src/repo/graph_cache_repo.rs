//! Graph cache repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist a full graph snapshot (nodes, terms, edges, contributions).
//! - Reload it without re-running detection.
//!
//! # Invariants
//! - `save_snapshot` replaces the whole cache in one immediate transaction.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::edge::{ConnectionType, Contribution, Edge, EdgeKey, EdgeOrigin, TextSpan};
use crate::model::node::{MatchTerm, Node, NodeKind, TermKind};
use crate::model::snapshot::GraphSnapshot;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

const META_FINGERPRINT: &str = "detector_fingerprint";
const META_SAVED_AT: &str = "saved_at";

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug)]
pub enum CacheError {
    Db(DbError),
    InvalidData(String),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted graph data: {message}"),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for CacheError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Snapshot plus the metadata it was saved with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CachedGraph {
    pub snapshot: GraphSnapshot,
    /// `None` when the cache was never written.
    pub fingerprint: Option<String>,
    pub saved_at: Option<i64>,
}

pub trait GraphCacheRepository {
    /// Replaces the cache contents with `snapshot`.
    fn save_snapshot(
        &mut self,
        snapshot: &GraphSnapshot,
        fingerprint: &str,
        saved_at: i64,
    ) -> CacheResult<()>;
    fn load_snapshot(&self) -> CacheResult<CachedGraph>;
}

pub struct SqliteGraphCacheRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteGraphCacheRepository<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl GraphCacheRepository for SqliteGraphCacheRepository<'_> {
    fn save_snapshot(
        &mut self,
        snapshot: &GraphSnapshot,
        fingerprint: &str,
        saved_at: i64,
    ) -> CacheResult<()> {
        let started_at = Instant::now();
        let result = write_snapshot(&mut *self.conn, snapshot, fingerprint, saved_at);
        match &result {
            Ok(()) => info!(
                "event=cache_save module=repo status=ok nodes={} edges={} duration_ms={}",
                snapshot.nodes.len(),
                snapshot.edges.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=cache_save module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn load_snapshot(&self) -> CacheResult<CachedGraph> {
        let started_at = Instant::now();
        let result = read_snapshot(&*self.conn);
        match &result {
            Ok(cached) => info!(
                "event=cache_load module=repo status=ok nodes={} edges={} duration_ms={}",
                cached.snapshot.nodes.len(),
                cached.snapshot.edges.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=cache_load module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

fn write_snapshot(
    conn: &mut Connection,
    snapshot: &GraphSnapshot,
    fingerprint: &str,
    saved_at: i64,
) -> CacheResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(
        "DELETE FROM graph_edge_contributions;
         DELETE FROM graph_edges;
         DELETE FROM graph_node_terms;
         DELETE FROM graph_nodes;",
    )?;

    {
        let mut insert_node = tx.prepare(
            "INSERT INTO graph_nodes (id, kind, title, version) VALUES (?1, ?2, ?3, ?4);",
        )?;
        let mut insert_term = tx.prepare(
            "INSERT INTO graph_node_terms (node_id, position, text, kind)
             VALUES (?1, ?2, ?3, ?4);",
        )?;
        for node in &snapshot.nodes {
            let version = i64::try_from(node.version).map_err(|_| {
                CacheError::InvalidData(format!("node {} version overflows storage", node.id))
            })?;
            let node_id = node.id.to_string();
            insert_node.execute(params![node_id, node.kind.as_str(), node.title, version])?;
            for (position, term) in node.terms.iter().enumerate() {
                insert_term.execute(params![
                    node_id,
                    position as i64,
                    term.text,
                    term.kind.as_str()
                ])?;
            }
        }

        let mut insert_edge = tx.prepare(
            "INSERT INTO graph_edges (
                id, source_id, target_id, kind, strength, origin, declared_by, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        )?;
        let mut insert_contribution = tx.prepare(
            "INSERT INTO graph_edge_contributions (edge_id, note_id, strength, span_start, span_end)
             VALUES (?1, ?2, ?3, ?4, ?5);",
        )?;
        for edge in &snapshot.edges {
            let edge_id = edge.id.to_string();
            let (origin, declared_by) = match &edge.origin {
                EdgeOrigin::Detected { .. } => ("detected", None),
                EdgeOrigin::UserDeclared { declared_by } => {
                    ("user_declared", Some(declared_by.to_string()))
                }
                EdgeOrigin::Imported => ("imported", None),
            };
            insert_edge.execute(params![
                edge_id,
                edge.source().to_string(),
                edge.target().to_string(),
                edge.kind().as_str(),
                edge.strength,
                origin,
                declared_by,
                edge.created_at,
                edge.updated_at,
            ])?;
            if let EdgeOrigin::Detected { contributions } = &edge.origin {
                for (note_id, contribution) in contributions {
                    insert_contribution.execute(params![
                        edge_id,
                        note_id.to_string(),
                        contribution.strength,
                        contribution.span.start as i64,
                        contribution.span.end as i64,
                    ])?;
                }
            }
        }

        let mut upsert_meta = tx.prepare(
            "INSERT INTO graph_cache_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        )?;
        upsert_meta.execute(params![META_FINGERPRINT, fingerprint])?;
        upsert_meta.execute(params![META_SAVED_AT, saved_at.to_string()])?;
    }

    tx.commit()?;
    Ok(())
}

fn read_snapshot(conn: &Connection) -> CacheResult<CachedGraph> {
    let fingerprint = read_meta(conn, META_FINGERPRINT)?;
    let saved_at = read_meta(conn, META_SAVED_AT)?
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| {
                CacheError::InvalidData(format!("invalid saved_at `{raw}` in graph_cache_meta"))
            })
        })
        .transpose()?;

    let mut terms: HashMap<Uuid, Vec<MatchTerm>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT node_id, text, kind FROM graph_node_terms ORDER BY node_id, position;",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let node_id = parse_uuid(row, "node_id", "graph_node_terms")?;
            let kind_text: String = row.get("kind")?;
            let kind = TermKind::parse(&kind_text).ok_or_else(|| {
                CacheError::InvalidData(format!("invalid term kind `{kind_text}`"))
            })?;
            terms
                .entry(node_id)
                .or_default()
                .push(MatchTerm::new(row.get::<_, String>("text")?, kind));
        }
    }

    let mut nodes = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT id, kind, title, version FROM graph_nodes;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id = parse_uuid(row, "id", "graph_nodes")?;
            let kind_text: String = row.get("kind")?;
            let kind = NodeKind::parse(&kind_text).ok_or_else(|| {
                CacheError::InvalidData(format!("invalid node kind `{kind_text}` for {id}"))
            })?;
            let version = u64::try_from(row.get::<_, i64>("version")?).map_err(|_| {
                CacheError::InvalidData(format!("negative version for node {id}"))
            })?;
            let node = Node {
                id,
                kind,
                title: row.get("title")?,
                terms: terms.remove(&id).unwrap_or_default(),
                version,
            };
            node.validate()
                .map_err(|err| CacheError::InvalidData(err.to_string()))?;
            nodes.push(node);
        }
    }

    let mut contributions: HashMap<Uuid, BTreeMap<Uuid, Contribution>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT edge_id, note_id, strength, span_start, span_end FROM graph_edge_contributions;",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let edge_id = parse_uuid(row, "edge_id", "graph_edge_contributions")?;
            let note_id = parse_uuid(row, "note_id", "graph_edge_contributions")?;
            let span = TextSpan::new(
                parse_offset(row, "span_start")?,
                parse_offset(row, "span_end")?,
            );
            contributions.entry(edge_id).or_default().insert(
                note_id,
                Contribution {
                    strength: row.get("strength")?,
                    span,
                },
            );
        }
    }

    let mut edges = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, kind, strength, origin, declared_by, created_at, updated_at
             FROM graph_edges;",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id = parse_uuid(row, "id", "graph_edges")?;
            let kind_text: String = row.get("kind")?;
            let kind = ConnectionType::parse(&kind_text).ok_or_else(|| {
                CacheError::InvalidData(format!("invalid connection type `{kind_text}`"))
            })?;
            let origin_text: String = row.get("origin")?;
            let origin = match origin_text.as_str() {
                "detected" => EdgeOrigin::Detected {
                    contributions: contributions.remove(&id).unwrap_or_default(),
                },
                "user_declared" => EdgeOrigin::UserDeclared {
                    declared_by: parse_uuid(row, "declared_by", "graph_edges")?,
                },
                "imported" => EdgeOrigin::Imported,
                other => {
                    return Err(CacheError::InvalidData(format!(
                        "invalid edge origin `{other}` for {id}"
                    )));
                }
            };
            if matches!(&origin, EdgeOrigin::Detected { contributions } if contributions.is_empty())
            {
                return Err(CacheError::InvalidData(format!(
                    "detected edge {id} has no contributions"
                )));
            }
            edges.push(Edge {
                id,
                key: EdgeKey::new(
                    parse_uuid(row, "source_id", "graph_edges")?,
                    parse_uuid(row, "target_id", "graph_edges")?,
                    kind,
                ),
                strength: row.get("strength")?,
                origin,
                created_at: row.get("created_at")?,
                updated_at: row.get("updated_at")?,
            });
        }
    }

    Ok(CachedGraph {
        snapshot: GraphSnapshot::new(nodes, edges),
        fingerprint,
        saved_at,
    })
}

fn read_meta(conn: &Connection, key: &str) -> CacheResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM graph_cache_meta WHERE key = ?1;",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

fn parse_uuid(row: &Row<'_>, column: &str, table: &str) -> CacheResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        CacheError::InvalidData(format!("invalid uuid value `{text}` in {table}.{column}"))
    })
}

fn parse_offset(row: &Row<'_>, column: &str) -> CacheResult<usize> {
    let value: i64 = row.get(column)?;
    usize::try_from(value).map_err(|_| {
        CacheError::InvalidData(format!("negative span offset {value} in {column}"))
    })
}
