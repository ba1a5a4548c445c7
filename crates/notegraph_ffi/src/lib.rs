//! Flutter-facing bridge over `notegraph_core`.

pub mod api;
