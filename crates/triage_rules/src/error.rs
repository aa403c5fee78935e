//! Error types for rule configuration

use std::io;
use thiserror::Error;

/// Rule configuration error. Parsing never yields a partial configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("Missing rule-set")]
    MissingRuleSets,

    #[error("{context} is missing '{field}'")]
    MissingField { context: String, field: String },

    #[error("Invalid value for '{key}': expected {expected}")]
    InvalidType { key: String, expected: &'static str },

    #[error("A rule with full-paths cannot have other rule definitions (rule '{rule}')")]
    FullPathsConflict { rule: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ConfigError>;
