//! Portable graph export.
//!
//! # Responsibility
//! - Serialize a node/edge set into `json` or Graphviz `dot`.
//! - Parse `json` exports back for import.
//!
//! # Invariants
//! - Nodes are sorted by id, edges by `(source, target, type)`; output for
//!   the same graph state is byte-for-byte identical.
//! - Only portable fields are exported: node id/kind/title and edge
//!   source/target/type/strength.

use crate::error::{GraphError, GraphResult};
use crate::model::edge::{ConnectionType, Edge, EdgeKey};
use crate::model::node::{Node, NodeId, NodeKind};
use crate::query::traversal::Subgraph;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Dot,
}

impl ExportFormat {
    /// Parses a format name; unknown names are a `SerializationError`.
    pub fn parse(value: &str) -> GraphResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "dot" => Ok(Self::Dot),
            other => Err(GraphError::SerializationError(format!(
                "unsupported export format `{other}`"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Dot => "dot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    pub strength: f64,
}

impl ExportEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source, self.target, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

impl GraphExport {
    /// Builds a canonical export from nodes and edges in any order.
    pub fn from_parts<'a>(
        nodes: impl IntoIterator<Item = &'a Node>,
        edges: impl IntoIterator<Item = &'a Edge>,
    ) -> Self {
        let mut export = Self {
            nodes: nodes
                .into_iter()
                .map(|node| ExportNode {
                    id: node.id,
                    kind: node.kind,
                    title: node.title.clone(),
                })
                .collect(),
            edges: edges
                .into_iter()
                .map(|edge| ExportEdge {
                    source: edge.source(),
                    target: edge.target(),
                    kind: edge.kind(),
                    strength: edge.strength,
                })
                .collect(),
        };
        export.canonicalize();
        export
    }

    /// Export of a traversal result: its nodes and induced edges.
    pub fn from_subgraph(subgraph: &Subgraph) -> Self {
        Self::from_parts(&subgraph.nodes, &subgraph.edges)
    }

    fn canonicalize(&mut self) {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.edges.sort_by(|a, b| a.key().cmp(&b.key()));
    }

    pub fn render(&self, format: ExportFormat) -> GraphResult<String> {
        match format {
            ExportFormat::Json => self.to_json(),
            ExportFormat::Dot => Ok(self.to_dot()),
        }
    }

    pub fn to_json(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a `json` export; the result is re-sorted canonically.
    pub fn from_json(payload: &str) -> GraphResult<Self> {
        let mut export: Self = serde_json::from_str(payload)?;
        export.canonicalize();
        Ok(export)
    }

    /// Graphviz digraph; undirected types render with `dir=none`.
    ///
    /// Strength goes in a custom `strength` attribute since Graphviz
    /// `weight` only takes integers.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph notegraph {\n");
        for node in &self.nodes {
            let shape = match node.kind {
                NodeKind::Note => "box",
                NodeKind::Person => "ellipse",
            };
            let _ = writeln!(
                out,
                "  \"{}\" [label=\"{}\", kind=\"{}\", shape={}];",
                node.id,
                escape_dot(&node.title),
                node.kind.as_str(),
                shape
            );
        }
        for edge in &self.edges {
            let dir = if edge.kind.is_directed() {
                ""
            } else {
                ", dir=none"
            };
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [type=\"{}\", strength={:.3}{}];",
                edge.source,
                edge.target,
                edge.kind.as_str(),
                edge.strength,
                dir
            );
        }
        out.push_str("}\n");
        out
    }
}

fn escape_dot(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' | '\r' => escaped.push(' '),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{ExportEdge, ExportFormat, ExportNode, GraphExport};
    use crate::error::GraphError;
    use crate::model::edge::ConnectionType;
    use crate::model::node::NodeKind;
    use uuid::Uuid;

    fn sample() -> GraphExport {
        GraphExport {
            nodes: vec![
                ExportNode {
                    id: Uuid::from_u128(2),
                    kind: NodeKind::Person,
                    title: "Bob \"BJ\" Jones".to_string(),
                },
                ExportNode {
                    id: Uuid::from_u128(1),
                    kind: NodeKind::Note,
                    title: "Standup".to_string(),
                },
            ],
            edges: vec![ExportEdge {
                source: Uuid::from_u128(1),
                target: Uuid::from_u128(2),
                kind: ConnectionType::Mentions,
                strength: 0.75,
            }],
        }
    }

    #[test]
    fn unknown_format_is_serialization_error() {
        assert!(matches!(
            ExportFormat::parse("graphml"),
            Err(GraphError::SerializationError(_))
        ));
        assert_eq!(ExportFormat::parse(" JSON ").unwrap(), ExportFormat::Json);
    }

    #[test]
    fn json_uses_type_field_and_parses_back_sorted() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["edges"][0]["type"], "mentions");

        let parsed = GraphExport::from_json(&json).unwrap();
        assert_eq!(parsed.nodes[0].id, Uuid::from_u128(1));
        assert_eq!(parsed.edges, sample().edges);
    }

    #[test]
    fn dot_escapes_labels() {
        let dot = sample().to_dot();
        assert!(dot.starts_with("digraph notegraph {"));
        assert!(dot.contains("label=\"Bob \\\"BJ\\\" Jones\""));
        assert!(dot.contains("type=\"mentions\", strength=0.750]"));
        assert!(!dot.contains("weight="));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            GraphExport::from_json("{\"nodes\": 3}"),
            Err(GraphError::SerializationError(_))
        ));
    }
}
