//! Knowledge graph domain model.
//!
//! # Responsibility
//! - Define nodes (notes, people), typed connections and their provenance.
//!
//! # Invariants
//! - Nodes and edges refer to each other by id only; no owning cycles.
//! - Timestamps are epoch milliseconds.

pub mod edge;
pub mod node;
pub mod snapshot;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
