//! Graph engine configuration.
//!
//! # Responsibility
//! - Hold tunables for matching, windowing, traversal caps and workers.
//! - Apply `NOTEGRAPH_*` environment overrides on top of defaults.
//!
//! # Invariants
//! - A config returned by `from_env`/`validate` has non-zero workers, limits
//!   and term length, and default limits never exceed their maxima.

use crate::detect::window::CoOccurrenceWindow;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const ENV_MIN_TERM_CHARS: &str = "NOTEGRAPH_MIN_TERM_CHARS";
pub const ENV_WINDOW: &str = "NOTEGRAPH_WINDOW";
pub const ENV_WORKERS: &str = "NOTEGRAPH_WORKERS";
pub const ENV_MAX_DEPTH: &str = "NOTEGRAPH_MAX_DEPTH";
pub const ENV_MAX_NODES: &str = "NOTEGRAPH_MAX_NODES";

/// Configuration error for invalid values or environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        field: &'static str,
        message: String,
    },
    InvalidEnv {
        key: &'static str,
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, message } => {
                write!(f, "invalid config `{field}`: {message}")
            }
            Self::InvalidEnv { key, value } => {
                write!(f, "invalid environment override {key}=`{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Terms shorter than this (in chars, after normalization) are not indexed.
    pub min_term_chars: usize,
    pub co_occurrence_window: CoOccurrenceWindow,
    pub max_subgraph_depth: usize,
    pub max_subgraph_nodes: usize,
    pub default_subgraph_nodes: usize,
    pub search_default_limit: usize,
    pub search_max_limit: usize,
    /// Detection worker threads.
    pub worker_count: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_term_chars: 3,
            co_occurrence_window: CoOccurrenceWindow::Sentence,
            max_subgraph_depth: 6,
            max_subgraph_nodes: 500,
            default_subgraph_nodes: 100,
            search_default_limit: 20,
            search_max_limit: 100,
            worker_count: 2,
        }
    }
}

impl GraphConfig {
    /// Defaults plus `NOTEGRAPH_*` overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup, then validates.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MIN_TERM_CHARS) {
            self.min_term_chars = parse_usize(ENV_MIN_TERM_CHARS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WINDOW) {
            self.co_occurrence_window =
                CoOccurrenceWindow::parse(&raw).ok_or(ConfigError::InvalidEnv {
                    key: ENV_WINDOW,
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup(ENV_WORKERS) {
            self.worker_count = parse_usize(ENV_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            self.max_subgraph_depth = parse_usize(ENV_MAX_DEPTH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_NODES) {
            self.max_subgraph_nodes = parse_usize(ENV_MAX_NODES, &raw)?;
            self.default_subgraph_nodes = self.default_subgraph_nodes.min(self.max_subgraph_nodes);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("min_term_chars", self.min_term_chars),
            ("max_subgraph_nodes", self.max_subgraph_nodes),
            ("default_subgraph_nodes", self.default_subgraph_nodes),
            ("search_default_limit", self.search_default_limit),
            ("search_max_limit", self.search_max_limit),
            ("worker_count", self.worker_count),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.default_subgraph_nodes > self.max_subgraph_nodes {
            return Err(ConfigError::InvalidValue {
                field: "default_subgraph_nodes",
                message: format!("exceeds max_subgraph_nodes ({})", self.max_subgraph_nodes),
            });
        }
        if self.search_default_limit > self.search_max_limit {
            return Err(ConfigError::InvalidValue {
                field: "search_default_limit",
                message: format!("exceeds search_max_limit ({})", self.search_max_limit),
            });
        }
        Ok(())
    }

    /// Identifies settings that change detection output.
    ///
    /// A persisted graph is only trusted when its fingerprint matches.
    pub fn detector_fingerprint(&self) -> String {
        format!(
            "min_term_chars={};window={}",
            self.min_term_chars, self.co_occurrence_window
        )
    }
}

fn parse_usize(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, GraphConfig, ENV_MAX_NODES, ENV_WINDOW, ENV_WORKERS};
    use crate::detect::window::CoOccurrenceWindow;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = GraphConfig::default();
        config.validate().unwrap();
        assert_eq!(config.min_term_chars, 3);
        assert_eq!(config.co_occurrence_window, CoOccurrenceWindow::Sentence);
        assert_eq!(config.worker_count, 2);
    }

    #[test]
    fn overrides_apply_and_clamp_default_nodes() {
        let config = GraphConfig::default()
            .with_overrides(lookup(&[(ENV_WINDOW, "chars:40"), (ENV_MAX_NODES, "50")]))
            .unwrap();
        assert_eq!(config.co_occurrence_window, CoOccurrenceWindow::Chars(40));
        assert_eq!(config.max_subgraph_nodes, 50);
        assert_eq!(config.default_subgraph_nodes, 50);
    }

    #[test]
    fn zero_workers_are_rejected() {
        let err = GraphConfig::default()
            .with_overrides(lookup(&[(ENV_WORKERS, "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "worker_count",
                ..
            }
        ));
    }

    #[test]
    fn malformed_override_names_the_key() {
        let err = GraphConfig::default()
            .with_overrides(lookup(&[(ENV_WINDOW, "page")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid environment override NOTEGRAPH_WINDOW=`page`");
    }

    #[test]
    fn json_config_fills_missing_fields() {
        let config: GraphConfig =
            serde_json::from_str(r#"{"worker_count": 4, "co_occurrence_window": "paragraph"}"#)
                .unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.co_occurrence_window, CoOccurrenceWindow::Paragraph);
        assert_eq!(config.search_max_limit, 100);
    }
}
