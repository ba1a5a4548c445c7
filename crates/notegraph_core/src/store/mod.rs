//! In-memory graph storage.

pub mod graph_store;
