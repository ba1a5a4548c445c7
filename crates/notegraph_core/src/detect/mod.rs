//! Deterministic connection detection.
//!
//! # Responsibility
//! - Derive `Mentions` and `CoOccursWith` edges from note content.
//! - Keep explicit user-declared links out of detection entirely.

pub mod detector;
pub mod window;
