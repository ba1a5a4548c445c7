//! Connection (edge) model.
//!
//! # Responsibility
//! - Define typed, scored connections and their provenance.
//!
//! # Invariants
//! - Edges are unique per `EdgeKey` (source, target, type).
//! - Undirected keys are canonical: `source < target`.
//! - `strength` stays within `[0, 1]`.

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type EdgeId = Uuid;

/// Enumerated connection types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Note text names another note or a person.
    Mentions,
    /// Two people named within one co-occurrence window.
    CoOccursWith,
    /// User-declared link between a note and another node.
    ExplicitLink,
    /// User-declared assignment of a note (todo) to a person.
    AssignedTo,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 4] = [
        Self::Mentions,
        Self::CoOccursWith,
        Self::ExplicitLink,
        Self::AssignedTo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mentions => "mentions",
            Self::CoOccursWith => "co_occurs_with",
            Self::ExplicitLink => "explicit_link",
            Self::AssignedTo => "assigned_to",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mentions" => Some(Self::Mentions),
            "co_occurs_with" => Some(Self::CoOccursWith),
            "explicit_link" => Some(Self::ExplicitLink),
            "assigned_to" => Some(Self::AssignedTo),
            _ => None,
        }
    }

    pub fn is_directed(self) -> bool {
        !matches!(self, Self::CoOccursWith)
    }

    /// Produced and removed by the connection detector.
    pub fn is_detected(self) -> bool {
        matches!(self, Self::Mentions | Self::CoOccursWith)
    }

    /// Inserted/removed only through explicit API calls.
    pub fn is_user_declared(self) -> bool {
        !self.is_detected()
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Mentions => "note text names the target note or person",
            Self::CoOccursWith => "two people are named in the same text window",
            Self::ExplicitLink => "link declared by the user",
            Self::AssignedTo => "note assigned to a person by the user",
        }
    }
}

/// Descriptor returned by the connection-type listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTypeInfo {
    pub kind: ConnectionType,
    pub name: &'static str,
    pub description: &'static str,
    pub directed: bool,
    pub user_declared: bool,
}

impl From<ConnectionType> for ConnectionTypeInfo {
    fn from(kind: ConnectionType) -> Self {
        Self {
            kind,
            name: kind.as_str(),
            description: kind.description(),
            directed: kind.is_directed(),
            user_declared: kind.is_user_declared(),
        }
    }
}

/// Uniqueness key of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: ConnectionType,
}

impl EdgeKey {
    /// Builds a key, ordering endpoints for undirected types.
    pub fn new(source: NodeId, target: NodeId, kind: ConnectionType) -> Self {
        if !kind.is_directed() && target < source {
            return Self {
                source: target,
                target: source,
                kind,
            };
        }
        Self {
            source,
            target,
            kind,
        }
    }

    pub fn involves(&self, node_id: NodeId) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// Returns the opposite endpoint, or `None` if `node_id` is not an endpoint.
    pub fn other(&self, node_id: NodeId) -> Option<NodeId> {
        if self.source == node_id {
            Some(self.target)
        } else if self.target == node_id {
            Some(self.source)
        } else {
            None
        }
    }
}

/// Byte range inside the original note content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &TextSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest span covering both.
    pub fn cover(&self, other: &TextSpan) -> TextSpan {
        TextSpan::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// One note's support for a detected edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub strength: f64,
    pub span: TextSpan,
}

/// What produced an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum EdgeOrigin {
    /// Detector output, keyed by contributing note id.
    Detected {
        contributions: BTreeMap<NodeId, Contribution>,
    },
    /// Explicit user action issued on behalf of `declared_by`.
    UserDeclared { declared_by: NodeId },
    /// Loaded from an export payload without per-note attribution.
    Imported,
}

/// Stored connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub key: EdgeKey,
    pub strength: f64,
    pub origin: EdgeOrigin,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds; unchanged when a diff re-proposes identical data.
    pub updated_at: i64,
}

impl Edge {
    pub fn source(&self) -> NodeId {
        self.key.source
    }

    pub fn target(&self) -> NodeId {
        self.key.target
    }

    pub fn kind(&self) -> ConnectionType {
        self.key.kind
    }

    /// Notes whose detection runs currently support this edge.
    pub fn contributors(&self) -> Vec<NodeId> {
        match &self.origin {
            EdgeOrigin::Detected { contributions } => contributions.keys().copied().collect(),
            EdgeOrigin::UserDeclared { .. } | EdgeOrigin::Imported => Vec::new(),
        }
    }
}

/// Detector output before it is committed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposedEdge {
    pub key: EdgeKey,
    pub strength: f64,
    pub span: TextSpan,
}

/// User-declared edge request from a note to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplicitEdge {
    pub target: NodeId,
    pub kind: ConnectionType,
    /// Defaults to `1.0`.
    pub strength: Option<f64>,
}

impl ExplicitEdge {
    pub fn link(target: NodeId) -> Self {
        Self {
            target,
            kind: ConnectionType::ExplicitLink,
            strength: None,
        }
    }

    pub fn assigned_to(person: NodeId) -> Self {
        Self {
            target: person,
            kind: ConnectionType::AssignedTo,
            strength: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionType, EdgeKey, TextSpan};
    use uuid::Uuid;

    #[test]
    fn undirected_keys_are_canonical() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(
            EdgeKey::new(b, a, ConnectionType::CoOccursWith),
            EdgeKey::new(a, b, ConnectionType::CoOccursWith)
        );
        assert_ne!(
            EdgeKey::new(b, a, ConnectionType::Mentions),
            EdgeKey::new(a, b, ConnectionType::Mentions)
        );
    }

    #[test]
    fn connection_type_names_round_trip() {
        for kind in ConnectionType::ALL {
            assert_eq!(ConnectionType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ConnectionType::parse("bogus"), None);
    }

    #[test]
    fn spans_overlap_only_when_sharing_bytes() {
        let a = TextSpan::new(0, 5);
        assert!(a.overlaps(&TextSpan::new(4, 8)));
        assert!(!a.overlaps(&TextSpan::new(5, 8)));
        assert_eq!(a.cover(&TextSpan::new(7, 9)), TextSpan::new(0, 9));
    }
}
