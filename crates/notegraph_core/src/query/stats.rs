//! Aggregate graph statistics.

use crate::model::edge::ConnectionType;
use crate::model::node::NodeKind;
use crate::query::GraphView;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub note_count: usize,
    pub person_count: usize,
    pub edge_count: usize,
    /// Every connection type is present, zero-filled.
    pub edge_count_by_type: BTreeMap<ConnectionType, usize>,
    /// `2 * edges / nodes`; `0.0` for an empty graph.
    pub average_degree: f64,
}

pub fn stats(view: GraphView<'_>) -> GraphStats {
    let (note_count, person_count) =
        view.index
            .nodes()
            .fold((0, 0), |(notes, people), node| match node.kind {
                NodeKind::Note => (notes + 1, people),
                NodeKind::Person => (notes, people + 1),
            });
    let node_count = note_count + person_count;
    let edge_count = view.store.edge_count();
    let average_degree = if node_count == 0 {
        0.0
    } else {
        (2 * edge_count) as f64 / node_count as f64
    };

    GraphStats {
        node_count,
        note_count,
        person_count,
        edge_count,
        edge_count_by_type: view.store.counts_by_type(),
        average_degree,
    }
}

#[cfg(test)]
mod tests {
    use super::stats;
    use crate::index::entity_index::EntityIndex;
    use crate::model::edge::ConnectionType;
    use crate::query::fixture::{mentions, note, person};
    use crate::query::GraphView;
    use crate::store::graph_store::GraphStore;

    #[test]
    fn empty_graph_has_zero_degree() {
        let index = EntityIndex::new(3);
        let store = GraphStore::new();
        let result = stats(GraphView::new(&index, &store));
        assert_eq!(result.node_count, 0);
        assert_eq!(result.average_degree, 0.0);
        assert_eq!(result.edge_count_by_type.len(), ConnectionType::ALL.len());
    }

    #[test]
    fn counts_nodes_and_edges() {
        let mut index = EntityIndex::new(3);
        note(&mut index, 1, "weekly sync");
        person(&mut index, 10, "Alice Smith");
        person(&mut index, 20, "Bob Jones");
        let mut store = GraphStore::new();
        mentions(&index, &mut store, 1, &[(10, 0.9), (20, 0.9)]);

        let result = stats(GraphView::new(&index, &store));
        assert_eq!(result.node_count, 3);
        assert_eq!(result.person_count, 2);
        assert_eq!(result.edge_count, 2);
        assert_eq!(result.edge_count_by_type[&ConnectionType::Mentions], 2);
        assert_eq!(result.edge_count_by_type[&ConnectionType::CoOccursWith], 0);
        assert!((result.average_degree - 4.0 / 3.0).abs() < 1e-9);
    }
}
