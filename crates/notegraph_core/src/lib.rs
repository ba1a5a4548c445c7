//! Knowledge graph engine for NoteGraph.
//! Links notes and people through detected mentions and user-declared edges,
//! and keeps the graph in step with note edits.

pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod export;
pub mod index;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{ConfigError, GraphConfig};
pub use error::{GraphError, GraphResult};
pub use export::{ExportFormat, GraphExport};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::edge::{
    ConnectionType, ConnectionTypeInfo, Edge, EdgeKey, EdgeOrigin, ExplicitEdge,
};
pub use model::node::{Node, NodeId, NodeKind, PersonNames};
pub use model::snapshot::GraphSnapshot;
pub use query::connections::{Direction, NodeConnection};
pub use query::search::SearchHit;
pub use query::stats::GraphStats;
pub use query::traversal::Subgraph;
pub use repo::graph_cache_repo::CacheError;
pub use service::coordinator::{NoteChange, SyncState};
pub use service::engine::{CacheLoad, DetectionReport, EngineError, GraphEngine};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
