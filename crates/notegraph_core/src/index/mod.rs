//! Entity index and term matching.
//!
//! # Responsibility
//! - Register graph nodes with their searchable terms.
//! - Provide storage-independent matching primitives for detection/search.

pub mod entity_index;
pub mod matcher;
pub mod text;
