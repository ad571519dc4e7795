//! Experiment Data Model
//!
//! This module provides the data structures shared by assignment,
//! aggregation and significance testing.
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Variant (N)
//!      │
//!      ├──< Assignment (N)  [unique per (experiment, subject)]
//!      └──< MetricEvent (N) [append-only]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trueno_adapt::experiment::{Experiment, ExperimentStatus, ExperimentStore, Variant};
//!
//! let experiment = Experiment::builder("exp-001", "Ranking boost")
//!     .variant(Variant::new("control", "Control", 0.5))
//!     .variant(Variant::new("boost", "Boost", 0.5).with_weight("title", 2.0))
//!     .build()?;
//!
//! let store = ExperimentStore::new();
//! store.create(experiment)?;
//! store.set_status("exp-001", ExperimentStatus::Active)?;
//! # Ok::<(), trueno_adapt::Error>(())
//! ```

mod assignment_record;
mod experiment_record;
mod metric_record;
mod store;

pub use assignment_record::{Assignment, AssignmentSource};
pub use experiment_record::{
    Experiment, ExperimentBuilder, ExperimentStatus, Variant, DEFAULT_ALLOCATION_TOLERANCE,
};
pub use metric_record::{MetricEvent, MetricEventBuilder};
pub use store::ExperimentStore;
