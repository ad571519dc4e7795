//! # Trueno-Adapt: Experimentation and Adaptive Rules
//!
//! Trueno-Adapt is the experimentation core of a search/analytics backend:
//! stable variant assignment, per-variant outcome aggregation with
//! two-proportion significance testing, and a prioritised rule engine that
//! adapts behaviour from live metrics, state and derived patterns.
//!
//! ## Components
//!
//! - [`assignment`]: deterministic or first-touch random assignment, persisted
//!   once per (experiment, subject) through a uniqueness-constrained [`kv`] store
//! - [`metrics`]: append-only event intake, summaries and z-test significance
//! - [`patterns`]: frequency and trend detection feeding back into rule history
//! - [`rules`]: condition/action rules evaluated with per-rule failure isolation
//! - [`service`]: the facade the transport layer calls
//!
//! ## Example Usage
//!
//! ```rust
//! use trueno_adapt::config::AdaptConfig;
//! use trueno_adapt::experiment::{Experiment, ExperimentStatus, Variant};
//! use trueno_adapt::service::AdaptService;
//!
//! # async fn example() -> trueno_adapt::Result<()> {
//! let service = AdaptService::new(AdaptConfig::default())?;
//! service.create_experiment(
//!     Experiment::builder("exp-1", "Ranking")
//!         .variant(Variant::new("control", "Control", 0.5))
//!         .variant(Variant::new("boost", "Boost", 0.5).with_weight("title", 2.0))
//!         .status(ExperimentStatus::Active)
//!         .build()?,
//! )?;
//!
//! let assigned = service.assign_variant("user-42", "exp-1").await?;
//! service.track_event("exp-1", &assigned.variant_id, "user-42", "conversion", 1.0)?;
//! let metrics = service.compute_metrics("exp-1")?;
//! assert_eq!(metrics[&assigned.variant_id].sample_size, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod assignment;
pub mod config;
pub mod error;
pub mod experiment;
pub mod history;
pub mod kv;
pub mod metrics;
pub mod patterns;
pub mod rules;
pub mod service;
pub mod telemetry;

pub use error::{Error, Result};
