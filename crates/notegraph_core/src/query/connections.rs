//! Incident connections of a single node.

use crate::error::{GraphError, GraphResult};
use crate::model::edge::Edge;
use crate::model::node::{Node, NodeId};
use crate::query::GraphView;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    Undirected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeConnection {
    pub edge: Edge,
    pub counterpart: Node,
    pub direction: Direction,
}

/// Incident edges ordered by strength desc, counterpart id asc, type asc.
pub fn node_connections(view: GraphView<'_>, node_id: NodeId) -> GraphResult<Vec<NodeConnection>> {
    if !view.index.contains(node_id) {
        return Err(GraphError::NotFound(node_id));
    }
    let mut connections = view
        .store
        .edges_of(node_id)
        .into_iter()
        .filter_map(|edge| {
            let other = edge.key.other(node_id)?;
            let counterpart = view.index.get(other)?.clone();
            let direction = if !edge.kind().is_directed() {
                Direction::Undirected
            } else if edge.source() == node_id {
                Direction::Outgoing
            } else {
                Direction::Incoming
            };
            Some(NodeConnection {
                edge: edge.clone(),
                counterpart,
                direction,
            })
        })
        .collect::<Vec<_>>();
    connections.sort_by(|a, b| {
        b.edge
            .strength
            .total_cmp(&a.edge.strength)
            .then_with(|| a.counterpart.id.cmp(&b.counterpart.id))
            .then_with(|| a.edge.kind().cmp(&b.edge.kind()))
    });
    Ok(connections)
}

#[cfg(test)]
mod tests {
    use super::{node_connections, Direction};
    use crate::index::entity_index::EntityIndex;
    use crate::query::fixture::{id, mentions, note, person};
    use crate::query::GraphView;
    use crate::store::graph_store::GraphStore;

    #[test]
    fn reports_direction_from_the_queried_side() {
        let mut index = EntityIndex::new(3);
        note(&mut index, 1, "kickoff");
        person(&mut index, 10, "Alice Smith");
        let mut store = GraphStore::new();
        mentions(&index, &mut store, 1, &[(10, 0.9)]);
        let view = GraphView::new(&index, &store);

        let from_note = node_connections(view, id(1)).unwrap();
        assert_eq!(from_note.len(), 1);
        assert_eq!(from_note[0].direction, Direction::Outgoing);
        assert_eq!(from_note[0].counterpart.id, id(10));

        let from_person = node_connections(view, id(10)).unwrap();
        assert_eq!(from_person[0].direction, Direction::Incoming);
        assert!(node_connections(view, id(99)).is_err());
    }
}
