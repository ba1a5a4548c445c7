//! Graph services.
//!
//! # Responsibility
//! - `knowledge_graph`: lock-guarded entity index plus graph store.
//! - `coordinator`: per-note sync state and background detection workers.
//! - `engine`: event and query facade consumed by the FFI and CLI layers.

pub mod coordinator;
pub mod engine;
pub mod knowledge_graph;
