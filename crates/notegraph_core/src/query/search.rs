//! Term search ranked by match strength and connectivity.

use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::model::node::Node;
use crate::query::GraphView;
use serde::Serialize;

/// Single search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub node: Node,
    pub strength: f64,
    pub degree: usize,
}

/// Resolves a caller-provided limit against config bounds.
pub fn resolve_limit(limit: Option<i64>, config: &GraphConfig) -> GraphResult<usize> {
    match limit {
        None => Ok(config.search_default_limit),
        Some(requested) => usize::try_from(requested)
            .ok()
            .filter(|value| (1..=config.search_max_limit).contains(value))
            .ok_or(GraphError::InvalidLimit {
                requested,
                max: config.search_max_limit,
            }),
    }
}

/// Ranks by match strength desc, then degree desc, then node id asc.
///
/// A blank query returns no hits.
pub fn search(view: GraphView<'_>, query: &str, limit: usize) -> Vec<SearchHit> {
    let mut hits = view
        .index
        .search_terms(query)
        .into_iter()
        .filter_map(|hit| {
            view.index.get(hit.node_id).map(|node| SearchHit {
                node: node.clone(),
                strength: hit.strength,
                degree: view.store.degree(hit.node_id),
            })
        })
        .collect::<Vec<_>>();
    hits.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| b.degree.cmp(&a.degree))
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::{resolve_limit, search};
    use crate::config::GraphConfig;
    use crate::error::GraphError;
    use crate::index::entity_index::EntityIndex;
    use crate::query::fixture::{id, mentions, note, person};
    use crate::query::GraphView;
    use crate::store::graph_store::GraphStore;

    #[test]
    fn equal_strength_prefers_higher_degree() {
        let mut index = EntityIndex::new(3);
        note(&mut index, 1, "Alice Notes");
        person(&mut index, 2, "Alice Smith");
        note(&mut index, 3, "standup");
        note(&mut index, 4, "retro");
        let mut store = GraphStore::new();
        mentions(&index, &mut store, 3, &[(2, 0.8)]);
        mentions(&index, &mut store, 4, &[(2, 0.8)]);

        let hits = search(GraphView::new(&index, &store), "alice", 20);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.id, id(2));
        assert_eq!(hits[0].degree, 2);
        assert_eq!(hits[1].node.id, id(1));
    }

    #[test]
    fn blank_query_and_limit() {
        let mut index = EntityIndex::new(3);
        for value in 1..=5 {
            note(&mut index, value, &format!("project {value}"));
        }
        let store = GraphStore::new();
        let view = GraphView::new(&index, &store);
        assert!(search(view, "   ", 20).is_empty());
        assert_eq!(search(view, "project", 3).len(), 3);
    }

    #[test]
    fn limit_bounds() {
        let config = GraphConfig::default();
        assert_eq!(resolve_limit(None, &config).unwrap(), 20);
        assert_eq!(resolve_limit(Some(100), &config).unwrap(), 100);
        assert_eq!(
            resolve_limit(Some(101), &config),
            Err(GraphError::InvalidLimit {
                requested: 101,
                max: 100
            })
        );
        assert!(resolve_limit(Some(0), &config).is_err());
    }
}
