//! Full graph state as plain data, for persistence and `get_graph`.

use crate::model::edge::Edge;
use crate::model::node::Node;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Sorted by node id.
    pub nodes: Vec<Node>,
    /// Sorted by edge key.
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn new(mut nodes: Vec<Node>, mut edges: Vec<Edge>) -> Self {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        edges.sort_by(|a, b| a.key.cmp(&b.key));
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
