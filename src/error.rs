//! Error types for Trueno-Adapt
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Adapt error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid experiment or engine configuration (rejected at creation time)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown experiment, rule or assignment
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up ("experiment", "rule", ...)
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A subject resolved to a different variant than the one already assigned
    #[error("Assignment conflict for subject '{subject_id}' in experiment '{experiment_id}': already assigned '{existing}', refusing to overwrite with '{attempted}'")]
    Conflict {
        /// Experiment of the conflicting assignment
        experiment_id: String,
        /// Subject of the conflicting assignment
        subject_id: String,
        /// Variant already persisted
        existing: String,
        /// Variant that was attempted
        attempted: String,
    },

    /// Statistical computation could not produce a finite result
    #[error("Computation error: {0}")]
    Computation(String),

    /// Event references an unknown experiment or variant
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Storage uniqueness constraint rejected a write
    #[error("Unique constraint violated for key '{0}'")]
    UniqueViolation(String),

    /// A single rule's condition or action failed
    #[error("Rule '{rule}' failed: {reason}")]
    RuleFailed {
        /// Rule name
        rule: String,
        /// Failure description
        reason: String,
    },

    /// Every rule evaluated in a pass failed
    #[error("All {} evaluated rules failed: {}", failed.len(), failed.join(", "))]
    AllRulesFailed {
        /// Names of the failed rules
        failed: Vec<String>,
    },

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
