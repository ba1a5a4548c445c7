//! Persistence of graph snapshots.
//!
//! # Responsibility
//! - Define the cache contract used by the engine at startup and shutdown.
//! - Isolate SQLite statements from graph semantics.
//!
//! # Invariants
//! - A save replaces the whole cache in one transaction.
//! - A load never runs detection; it only rebuilds stored nodes and edges.

pub mod graph_cache_repo;
