//! Assignment Record - durable subject → variant mapping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an assignment came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// Hash bucketing of the experiment/subject pair.
    Deterministic,
    /// Uniform draw on first touch.
    WeightedRandom,
    /// Decided outside the service and recorded through `pin`.
    Pinned,
}

/// Assignment Record maps one subject to one variant within one experiment.
///
/// Immutable once created and unique per (experiment, subject).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    experiment_id: String,
    subject_id: String,
    variant_id: String,
    source: AssignmentSource,
    assigned_at: DateTime<Utc>,
}

impl Assignment {
    /// Create a new assignment stamped with the current time.
    #[must_use]
    pub fn new(
        experiment_id: impl Into<String>,
        subject_id: impl Into<String>,
        variant_id: impl Into<String>,
        source: AssignmentSource,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            subject_id: subject_id.into(),
            variant_id: variant_id.into(),
            source,
            assigned_at: Utc::now(),
        }
    }

    /// Storage key carrying the (experiment, subject) uniqueness constraint.
    ///
    /// The experiment ID is length-prefixed so IDs containing `/` cannot
    /// collide with another pair.
    #[must_use]
    pub fn storage_key(experiment_id: &str, subject_id: &str) -> String {
        format!("assignment/{}:{experiment_id}/{subject_id}", experiment_id.len())
    }

    /// Whether this record belongs to the given (experiment, subject).
    #[must_use]
    pub fn is_for(&self, experiment_id: &str, subject_id: &str) -> bool {
        self.experiment_id == experiment_id && self.subject_id == subject_id
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the subject ID.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Get the assigned variant ID.
    #[must_use]
    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    /// Get the assignment source.
    #[must_use]
    pub const fn source(&self) -> AssignmentSource {
        self.source
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }
}
