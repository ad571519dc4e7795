//! Variant assignment
//!
//! Hands out one stable variant per (experiment, subject). The first exposure
//! computes a variant (deterministic hash bucketing or a weighted random
//! draw) and persists it through [`KvStore::insert_unique`]; every later call
//! returns the persisted record unchanged.
//!
//! ## Concurrent first touch
//!
//! Two requests for a brand-new subject can both miss the read and both try
//! to persist. The storage uniqueness constraint lets exactly one write
//! through; the loser sees [`Error::UniqueViolation`], re-reads and returns
//! the winner's record. Callers never observe two variants for one subject.
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_adapt::assignment::VariantAssignmentService;
//! use trueno_adapt::config::AssignmentStrategy;
//! use trueno_adapt::experiment::{Experiment, ExperimentStatus, Variant};
//! use trueno_adapt::kv::MemoryKvStore;
//!
//! # async fn example() -> trueno_adapt::Result<()> {
//! let experiment = Experiment::builder("exp-1", "Ranking")
//!     .variant(Variant::new("control", "Control", 0.5))
//!     .variant(Variant::new("boost", "Boost", 0.5))
//!     .status(ExperimentStatus::Active)
//!     .build()?;
//!
//! let service = VariantAssignmentService::new(
//!     Arc::new(MemoryKvStore::new()),
//!     AssignmentStrategy::Deterministic,
//! );
//! let first = service.assign("user-1", &experiment).await?;
//! let again = service.assign("user-1", &experiment).await?;
//! assert_eq!(first.variant_id(), again.variant_id());
//! # Ok(())
//! # }
//! ```

mod bucket;

pub use bucket::{hash_point, random_point, select_variant};

use std::sync::Arc;

use chrono::Utc;

use crate::config::AssignmentStrategy;
use crate::experiment::{Assignment, AssignmentSource, Experiment};
use crate::kv::KvStore;
use crate::{Error, Result};

/// Assigns and retrieves stable variants per (experiment, subject).
pub struct VariantAssignmentService<S: KvStore> {
    store: Arc<S>,
    strategy: AssignmentStrategy,
}

impl<S: KvStore> VariantAssignmentService<S> {
    /// Create a service persisting through `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, strategy: AssignmentStrategy) -> Self {
        Self { store, strategy }
    }

    /// Strategy used for new assignments.
    #[must_use]
    pub const fn strategy(&self) -> AssignmentStrategy {
        self.strategy
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Return the subject's assignment, creating it on first exposure.
    ///
    /// # Errors
    /// - [`Error::NotFound`] if the experiment is not active right now
    /// - [`Error::Storage`] / [`Error::Json`] if the store misbehaves
    pub async fn assign(&self, subject_id: &str, experiment: &Experiment) -> Result<Assignment> {
        let experiment_id = experiment.experiment_id();
        if !experiment.is_active_at(Utc::now()) {
            return Err(Error::not_found("active experiment", experiment_id));
        }

        if let Some(existing) = self.get(experiment_id, subject_id).await? {
            tracing::debug!(experiment_id, subject_id, variant_id = existing.variant_id(), "reusing assignment");
            return Ok(existing);
        }

        let (point, source) = match self.strategy {
            AssignmentStrategy::Deterministic => {
                (hash_point(experiment_id, subject_id), AssignmentSource::Deterministic)
            }
            AssignmentStrategy::WeightedRandom => (random_point(), AssignmentSource::WeightedRandom),
        };
        let variant = select_variant(experiment.variants(), point).ok_or_else(|| {
            Error::Configuration(format!("experiment '{experiment_id}' has no variants"))
        })?;

        let candidate = Assignment::new(experiment_id, subject_id, variant.id(), source);
        self.persist(candidate).await
    }

    /// Record an externally decided assignment.
    ///
    /// Pinning the variant a subject already has is a no-op that returns the
    /// stored record.
    ///
    /// # Errors
    /// - [`Error::InvalidReference`] if `variant_id` is not part of the experiment
    /// - [`Error::Conflict`] if the subject already has a different variant
    pub async fn pin(&self, subject_id: &str, experiment: &Experiment, variant_id: &str) -> Result<Assignment> {
        let experiment_id = experiment.experiment_id();
        if experiment.variant(variant_id).is_none() {
            return Err(Error::InvalidReference(format!(
                "variant '{variant_id}' is not part of experiment '{experiment_id}'"
            )));
        }

        let candidate = Assignment::new(experiment_id, subject_id, variant_id, AssignmentSource::Pinned);
        let stored = self.persist(candidate).await?;
        if stored.variant_id() != variant_id {
            return Err(Error::Conflict {
                experiment_id: experiment_id.to_string(),
                subject_id: subject_id.to_string(),
                existing: stored.variant_id().to_string(),
                attempted: variant_id.to_string(),
            });
        }
        Ok(stored)
    }

    /// Look up an existing assignment.
    ///
    /// # Errors
    /// - [`Error::Json`] if the stored record cannot be decoded
    /// - [`Error::Storage`] if the record under the key belongs to another pair
    pub async fn get(&self, experiment_id: &str, subject_id: &str) -> Result<Option<Assignment>> {
        let key = Assignment::storage_key(experiment_id, subject_id);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let stored: Assignment = serde_json::from_slice(&bytes)?;
        if !stored.is_for(experiment_id, subject_id) {
            return Err(Error::Storage(format!(
                "record under '{key}' belongs to experiment '{}' subject '{}'",
                stored.experiment_id(),
                stored.subject_id()
            )));
        }
        Ok(Some(stored))
    }

    /// Write once; on a lost race return whatever the winner stored.
    async fn persist(&self, candidate: Assignment) -> Result<Assignment> {
        let key = Assignment::storage_key(candidate.experiment_id(), candidate.subject_id());
        let bytes = serde_json::to_vec(&candidate)?;

        match self.store.insert_unique(&key, bytes).await {
            Ok(()) => {
                tracing::info!(
                    experiment_id = candidate.experiment_id(),
                    subject_id = candidate.subject_id(),
                    variant_id = candidate.variant_id(),
                    source = ?candidate.source(),
                    "created assignment"
                );
                Ok(candidate)
            }
            Err(Error::UniqueViolation(_)) => {
                let winner = self
                    .get(candidate.experiment_id(), candidate.subject_id())
                    .await?
                    .ok_or_else(|| {
                        Error::Storage(format!(
                            "unique constraint rejected '{key}' but no record is readable"
                        ))
                    })?;
                tracing::debug!(
                    experiment_id = candidate.experiment_id(),
                    subject_id = candidate.subject_id(),
                    winner = winner.variant_id(),
                    "lost first-touch race, returning stored assignment"
                );
                Ok(winner)
            }
            Err(e) => Err(e),
        }
    }
}
