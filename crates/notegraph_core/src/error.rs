//! Core graph error taxonomy.
//!
//! # Responsibility
//! - Define the semantic errors surfaced by graph mutations and queries.
//!
//! # Invariants
//! - Detection never produces an error; worst case it yields no edges.
//! - `Conflict` is resolved inside the update coordinator and only reaches
//!   callers of the low-level `apply_diff` API.

use crate::model::edge::ConnectionType;
use crate::model::node::NodeId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Unknown node id.
    NotFound(NodeId),
    /// Traversal depth outside `0..=max`.
    InvalidDepth { requested: i64, max: usize },
    /// Node/result limit outside `1..=max`.
    InvalidLimit { requested: i64, max: usize },
    /// Diff computed against a version the index no longer holds.
    Conflict {
        node_id: NodeId,
        expected: u64,
        actual: u64,
    },
    /// Unsupported export format or malformed import payload.
    SerializationError(String),
    /// Node payload rejected by validation.
    InvalidNode(String),
    /// Edge payload rejected (self-link, wrong type, strength out of range).
    InvalidConnection {
        kind: ConnectionType,
        message: String,
    },
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "graph node not found: {id}"),
            Self::InvalidDepth { requested, max } => {
                write!(f, "invalid traversal depth {requested}; expected 0..={max}")
            }
            Self::InvalidLimit { requested, max } => {
                write!(f, "invalid limit {requested}; expected 1..={max}")
            }
            Self::Conflict {
                node_id,
                expected,
                actual,
            } => write!(
                f,
                "stale detection for {node_id}: computed for version {expected}, index holds {actual}"
            ),
            Self::SerializationError(message) => write!(f, "serialization error: {message}"),
            Self::InvalidNode(message) => write!(f, "invalid node: {message}"),
            Self::InvalidConnection { kind, message } => {
                write!(f, "invalid `{}` connection: {message}", kind.as_str())
            }
        }
    }
}

impl Error for GraphError {}

impl From<serde_json::Error> for GraphError {
    fn from(value: serde_json::Error) -> Self {
        Self::SerializationError(value.to_string())
    }
}

impl GraphError {
    /// Stable machine-readable code used in logs and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidDepth { .. } => "invalid_depth",
            Self::InvalidLimit { .. } => "invalid_limit",
            Self::Conflict { .. } => "conflict",
            Self::SerializationError(_) => "serialization_error",
            Self::InvalidNode(_) => "invalid_node",
            Self::InvalidConnection { .. } => "invalid_connection",
        }
    }
}
