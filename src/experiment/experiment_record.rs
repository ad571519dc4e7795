//! Experiment Record - root entity of an A/B test

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Accepted deviation of the allocation sum from 1.0 when no explicit
/// tolerance is configured.
pub const DEFAULT_ALLOCATION_TOLERANCE: f64 = 1e-3;

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Being edited, not visible to subjects.
    Draft,
    /// Approved and waiting to start.
    Pending,
    /// Receiving traffic. Only active experiments hand out assignments.
    Active,
    /// Temporarily stopped; existing assignments are kept.
    Paused,
    /// Finished. Terminal.
    Completed,
}

impl ExperimentStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// ```text
    /// Draft → Pending → Active ⇄ Paused
    ///   └───────────────┘  │        │
    ///                      └→ Completed ←┘
    /// ```
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Pending | Self::Active)
                | (Self::Pending, Self::Active | Self::Draft)
                | (Self::Active, Self::Paused | Self::Completed)
                | (Self::Paused, Self::Active | Self::Completed)
        )
    }
}

/// One arm of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    id: String,
    name: String,
    allocation: f64,
    #[serde(default)]
    weights: BTreeMap<String, f64>,
}

impl Variant {
    /// Create a variant with the given traffic allocation in (0, 1].
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, allocation: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            allocation,
            weights: BTreeMap::new(),
        }
    }

    /// Attach a secondary weight (e.g. ranking boosts this arm applies).
    #[must_use]
    pub fn with_weight(mut self, key: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(key.into(), weight);
        self
    }

    /// Get the variant ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the variant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the traffic allocation.
    #[must_use]
    pub const fn allocation(&self) -> f64 {
        self.allocation
    }

    /// Get the secondary weight map.
    #[must_use]
    pub const fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

/// Experiment Record describes a configured comparison of variants.
///
/// Construction goes through [`ExperimentBuilder::build`], which enforces
/// the allocation invariant: every allocation lies in (0, 1] and the sum is
/// 1 within [`DEFAULT_ALLOCATION_TOLERANCE`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    experiment_id: String,
    name: String,
    status: ExperimentStatus,
    variants: Vec<Variant>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Experiment {
    /// Create a builder for an experiment in `Draft` status.
    #[must_use]
    pub fn builder(experiment_id: impl Into<String>, name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(experiment_id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Get the variants in declaration order. The first one is the control.
    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Look up a variant by ID.
    #[must_use]
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Get the start of the optional running window.
    #[must_use]
    pub const fn starts_at(&self) -> Option<DateTime<Utc>> {
        self.starts_at
    }

    /// Get the end of the optional running window (exclusive).
    #[must_use]
    pub const fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.ends_at
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the experiment hands out assignments at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ExperimentStatus::Active
            && self.starts_at.map_or(true, |start| now >= start)
            && self.ends_at.map_or(true, |end| now < end)
    }

    /// Move to a new lifecycle status.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the lifecycle forbids the move.
    pub fn transition(&mut self, next: ExperimentStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(Error::Configuration(format!(
                "experiment '{}' cannot move from {:?} to {:?}",
                self.experiment_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Check the structural invariants. Records loaded from an external
    /// store bypass the builder, so the store re-runs this on registration.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] describing the first violation.
    pub fn validate(&self, tolerance: f64) -> Result<()> {
        if self.experiment_id.is_empty() {
            return Err(Error::Configuration("experiment id must not be empty".to_string()));
        }
        if self.variants.is_empty() {
            return Err(Error::Configuration(format!(
                "experiment '{}' has no variants",
                self.experiment_id
            )));
        }
        let mut seen = FxHashSet::default();
        for variant in &self.variants {
            if !seen.insert(variant.id.as_str()) {
                return Err(Error::Configuration(format!(
                    "experiment '{}' declares variant '{}' twice",
                    self.experiment_id, variant.id
                )));
            }
            if !(variant.allocation > 0.0 && variant.allocation <= 1.0) {
                return Err(Error::Configuration(format!(
                    "variant '{}' allocation {} is outside (0, 1]",
                    variant.id, variant.allocation
                )));
            }
        }
        let total: f64 = self.variants.iter().map(Variant::allocation).sum();
        if (total - 1.0).abs() > tolerance {
            return Err(Error::Configuration(format!(
                "experiment '{}' allocations sum to {total:.6}, expected 1 ± {tolerance}",
                self.experiment_id
            )));
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at) {
            if start >= end {
                return Err(Error::Configuration(format!(
                    "experiment '{}' window ends before it starts",
                    self.experiment_id
                )));
            }
        }
        Ok(())
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    experiment_id: String,
    name: String,
    status: ExperimentStatus,
    variants: Vec<Variant>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            status: ExperimentStatus::Draft,
            variants: Vec::new(),
            starts_at: None,
            ends_at: None,
            created_at: Utc::now(),
        }
    }

    /// Append a variant. Order matters: cumulative allocation ranges follow it.
    #[must_use]
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Set the initial status.
    #[must_use]
    pub const fn status(mut self, status: ExperimentStatus) -> Self {
        self.status = status;
        self
    }

    /// Restrict assignment to `[starts_at, ends_at)`.
    #[must_use]
    pub const fn window(mut self, starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build with the default allocation tolerance.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the allocation invariant fails.
    pub fn build(self) -> Result<Experiment> {
        self.build_with_tolerance(DEFAULT_ALLOCATION_TOLERANCE)
    }

    /// Build with an explicit allocation tolerance.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the allocation invariant fails.
    pub fn build_with_tolerance(self, tolerance: f64) -> Result<Experiment> {
        let experiment = Experiment {
            experiment_id: self.experiment_id,
            name: self.name,
            status: self.status,
            variants: self.variants,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            created_at: self.created_at,
        };
        experiment.validate(tolerance)?;
        Ok(experiment)
    }
}
