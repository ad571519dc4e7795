//! Experiment Store - in-memory registry of validated experiments
//!
//! The store mirrors the externally persisted experiment records for the
//! lifetime of the process. Every experiment enters through [`ExperimentStore::create`],
//! which re-checks the allocation invariant so records loaded from JSON
//! cannot bypass it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::experiment_record::DEFAULT_ALLOCATION_TOLERANCE;
use super::{Experiment, ExperimentStatus};
use crate::{Error, Result};

/// Concurrent registry of experiments keyed by ID.
///
/// ## Design
///
/// Uses `DashMap` so readers on the assignment path never block each other.
/// Lookups hand out clones: an experiment is a small value and callers must
/// not hold shard locks across `.await` points.
#[derive(Debug)]
pub struct ExperimentStore {
    experiments: DashMap<String, Experiment>,
    allocation_tolerance: f64,
}

impl Default for ExperimentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentStore {
    /// Create an empty store with the default allocation tolerance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_ALLOCATION_TOLERANCE)
    }

    /// Create an empty store with a custom allocation tolerance.
    #[must_use]
    pub fn with_tolerance(allocation_tolerance: f64) -> Self {
        Self {
            experiments: DashMap::new(),
            allocation_tolerance,
        }
    }

    /// Check if the store holds no experiments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Register a new experiment.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the experiment violates the
    /// allocation invariant or its ID is already registered.
    pub fn create(&self, experiment: Experiment) -> Result<()> {
        experiment.validate(self.allocation_tolerance)?;
        match self.experiments.entry(experiment.experiment_id().to_string()) {
            Entry::Occupied(entry) => Err(Error::Configuration(format!(
                "experiment '{}' already exists",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                tracing::info!(
                    experiment_id = experiment.experiment_id(),
                    variants = experiment.variants().len(),
                    "registered experiment"
                );
                entry.insert(experiment);
                Ok(())
            }
        }
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get(&self, experiment_id: &str) -> Option<Experiment> {
        self.experiments.get(experiment_id).map(|e| e.value().clone())
    }

    /// Get an experiment by ID or fail.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown IDs.
    pub fn require(&self, experiment_id: &str) -> Result<Experiment> {
        self.get(experiment_id)
            .ok_or_else(|| Error::not_found("experiment", experiment_id))
    }

    /// Move an experiment to a new lifecycle status.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown IDs and
    /// [`Error::Configuration`] for transitions the lifecycle forbids.
    pub fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<()> {
        let mut entry = self
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| Error::not_found("experiment", experiment_id))?;
        let previous = entry.status();
        entry.transition(status)?;
        tracing::info!(experiment_id, ?previous, ?status, "experiment status changed");
        Ok(())
    }

    /// IDs of all registered experiments, sorted.
    #[must_use]
    pub fn experiment_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.experiments.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
