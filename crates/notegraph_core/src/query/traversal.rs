//! Neighbor lookup and bounded subgraph traversal.
//!
//! # Invariants
//! - `subgraph` returns at most `max_nodes` nodes (root included), none more
//!   than `max_depth` hops from the root.
//! - Each level is expanded in strength-desc, node-id-asc order, so the node
//!   cap keeps the strongest frontier.

use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::model::edge::{ConnectionType, Edge, EdgeId};
use crate::model::node::{Node, NodeId};
use crate::query::GraphView;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Adjacent node with the strongest connecting edge strength.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub node: Node,
    pub strength: f64,
}

/// Validated traversal caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubgraphBounds {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl SubgraphBounds {
    /// Checks `depth` against `0..=max_subgraph_depth` and `max_nodes`
    /// against `1..=max_subgraph_nodes`; `None` uses the configured default.
    pub fn new(depth: i64, max_nodes: Option<i64>, config: &GraphConfig) -> GraphResult<Self> {
        let max_depth = usize::try_from(depth)
            .ok()
            .filter(|value| *value <= config.max_subgraph_depth)
            .ok_or(GraphError::InvalidDepth {
                requested: depth,
                max: config.max_subgraph_depth,
            })?;
        let max_nodes = match max_nodes {
            None => config.default_subgraph_nodes,
            Some(requested) => usize::try_from(requested)
                .ok()
                .filter(|value| (1..=config.max_subgraph_nodes).contains(value))
                .ok_or(GraphError::InvalidLimit {
                    requested,
                    max: config.max_subgraph_nodes,
                })?,
        };
        Ok(Self {
            max_depth,
            max_nodes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subgraph {
    pub root: NodeId,
    /// Sorted by node id.
    pub nodes: Vec<Node>,
    /// Induced edges, sorted by key.
    pub edges: Vec<Edge>,
    /// Hop distance from the root per included node.
    pub depths: BTreeMap<NodeId, usize>,
    /// Reachable nodes were dropped by the node cap.
    pub truncated: bool,
}

/// Distinct adjacent nodes, optionally restricted to one connection type.
pub fn neighbors(
    view: GraphView<'_>,
    node_id: NodeId,
    type_filter: Option<ConnectionType>,
) -> GraphResult<Vec<Neighbor>> {
    if !view.index.contains(node_id) {
        return Err(GraphError::NotFound(node_id));
    }
    let mut strongest: HashMap<NodeId, f64> = HashMap::new();
    for edge in view.store.edges_of(node_id) {
        if type_filter.is_some_and(|kind| kind != edge.kind()) {
            continue;
        }
        let Some(other) = edge.key.other(node_id) else {
            continue;
        };
        let slot = strongest.entry(other).or_insert(0.0);
        *slot = slot.max(edge.strength);
    }

    let mut result = strongest
        .into_iter()
        .filter_map(|(other, strength)| {
            view.index.get(other).map(|node| Neighbor {
                node: node.clone(),
                strength,
            })
        })
        .collect::<Vec<_>>();
    result.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    Ok(result)
}

/// Breadth-first expansion around `root`, bounded by depth and node count.
pub fn subgraph(
    view: GraphView<'_>,
    root: NodeId,
    bounds: SubgraphBounds,
) -> GraphResult<Subgraph> {
    if !view.index.contains(root) {
        return Err(GraphError::NotFound(root));
    }

    let mut depths: BTreeMap<NodeId, usize> = BTreeMap::new();
    depths.insert(root, 0);
    let mut frontier = vec![root];
    let mut truncated = false;

    for level in 1..=bounds.max_depth {
        if frontier.is_empty() || truncated {
            break;
        }
        let mut candidates: HashMap<NodeId, f64> = HashMap::new();
        for node_id in &frontier {
            for edge in view.store.edges_of(*node_id) {
                let Some(other) = edge.key.other(*node_id) else {
                    continue;
                };
                if depths.contains_key(&other) || !view.index.contains(other) {
                    continue;
                }
                let slot = candidates.entry(other).or_insert(0.0);
                *slot = slot.max(edge.strength);
            }
        }

        let mut ordered = candidates.into_iter().collect::<Vec<_>>();
        ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut next = Vec::with_capacity(ordered.len());
        for (node_id, _) in ordered {
            if depths.len() >= bounds.max_nodes {
                truncated = true;
                break;
            }
            depths.insert(node_id, level);
            next.push(node_id);
        }
        frontier = next;
    }

    let included = depths.keys().copied().collect::<HashSet<_>>();
    let mut seen: HashSet<EdgeId> = HashSet::new();
    let mut edges = Vec::new();
    for node_id in &included {
        for edge in view.store.edges_of(*node_id) {
            if included.contains(&edge.source())
                && included.contains(&edge.target())
                && seen.insert(edge.id)
            {
                edges.push(edge.clone());
            }
        }
    }
    edges.sort_by(|a, b| a.key.cmp(&b.key));

    let nodes = depths
        .keys()
        .filter_map(|node_id| view.index.get(*node_id).cloned())
        .collect();

    Ok(Subgraph {
        root,
        nodes,
        edges,
        depths,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::{neighbors, subgraph, SubgraphBounds};
    use crate::config::GraphConfig;
    use crate::error::GraphError;
    use crate::index::entity_index::EntityIndex;
    use crate::model::edge::ConnectionType;
    use crate::query::fixture::{id, mentions, note, person};
    use crate::query::GraphView;
    use crate::store::graph_store::GraphStore;

    /// 1 -> {10 (0.9), 20 (0.5)}, 2 -> {20 (0.7)}, 3 -> {2 (0.4)}
    fn chain() -> (EntityIndex, GraphStore) {
        let mut index = EntityIndex::new(3);
        note(&mut index, 1, "first note");
        note(&mut index, 2, "second note");
        note(&mut index, 3, "third note");
        person(&mut index, 10, "Alice Smith");
        person(&mut index, 20, "Bob Jones");
        let mut store = GraphStore::new();
        mentions(&index, &mut store, 1, &[(10, 0.9), (20, 0.5)]);
        mentions(&index, &mut store, 2, &[(20, 0.7)]);
        mentions(&index, &mut store, 3, &[(2, 0.4)]);
        (index, store)
    }

    fn bounds(depth: usize, nodes: usize) -> SubgraphBounds {
        SubgraphBounds {
            max_depth: depth,
            max_nodes: nodes,
        }
    }

    #[test]
    fn neighbors_sorted_by_strength() {
        let (index, store) = chain();
        let view = GraphView::new(&index, &store);
        let result = neighbors(view, id(20), None).unwrap();
        let ids = result.iter().map(|n| n.node.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![id(2), id(1)]);

        let filtered = neighbors(view, id(20), Some(ConnectionType::CoOccursWith)).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn subgraph_respects_depth() {
        let (index, store) = chain();
        let view = GraphView::new(&index, &store);

        let zero = subgraph(view, id(1), bounds(0, 100)).unwrap();
        assert_eq!(zero.nodes.len(), 1);
        assert!(zero.edges.is_empty());

        let two = subgraph(view, id(1), bounds(2, 100)).unwrap();
        assert_eq!(two.depths.get(&id(2)), Some(&2));
        assert!(!two.depths.contains_key(&id(3)));
        assert!(two.depths.values().all(|depth| *depth <= 2));
        assert_eq!(two.edges.len(), 3);
    }

    #[test]
    fn subgraph_node_cap_keeps_strongest() {
        let (index, store) = chain();
        let view = GraphView::new(&index, &store);
        let capped = subgraph(view, id(1), bounds(6, 2)).unwrap();
        assert_eq!(capped.nodes.len(), 2);
        assert!(capped.depths.contains_key(&id(10)));
        assert!(capped.truncated);
    }

    #[test]
    fn bounds_reject_out_of_range_values() {
        let config = GraphConfig::default();
        assert_eq!(
            SubgraphBounds::new(-1, None, &config),
            Err(GraphError::InvalidDepth {
                requested: -1,
                max: 6
            })
        );
        assert_eq!(
            SubgraphBounds::new(7, None, &config),
            Err(GraphError::InvalidDepth {
                requested: 7,
                max: 6
            })
        );
        assert!(matches!(
            SubgraphBounds::new(1, Some(0), &config),
            Err(GraphError::InvalidLimit { requested: 0, .. })
        ));
        assert_eq!(
            SubgraphBounds::new(2, None, &config).unwrap(),
            bounds(2, config.default_subgraph_nodes)
        );
    }

    #[test]
    fn unknown_root_is_not_found() {
        let (index, store) = chain();
        let view = GraphView::new(&index, &store);
        assert_eq!(
            subgraph(view, id(99), bounds(1, 10)).unwrap_err(),
            GraphError::NotFound(id(99))
        );
    }
}
