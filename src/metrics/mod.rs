//! Variant metrics and significance
//!
//! - [`MetricsAggregator`]: append-only event intake, summaries recomputed on demand
//! - [`SignificanceCalculator`]: two-proportion z-test between two variants
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_adapt::experiment::{Experiment, ExperimentStore, MetricEvent, Variant};
//! use trueno_adapt::metrics::{MetricsAggregator, SignificanceCalculator};
//!
//! let store = Arc::new(ExperimentStore::new());
//! store.create(
//!     Experiment::builder("exp-1", "Ranking")
//!         .variant(Variant::new("control", "Control", 0.5))
//!         .variant(Variant::new("boost", "Boost", 0.5))
//!         .build()?,
//! )?;
//!
//! let aggregator = MetricsAggregator::new(store);
//! aggregator.record(MetricEvent::new("exp-1", "control", "u1", "conversion", 1.0))?;
//! aggregator.record(MetricEvent::new("exp-1", "boost", "u2", "click", 1.0))?;
//!
//! let proportions = aggregator.proportions("exp-1", "conversion")?;
//! let result = SignificanceCalculator::default()
//!     .compute(proportions["control"], proportions["boost"])?;
//! assert!(!result.significant);
//! # Ok::<(), trueno_adapt::Error>(())
//! ```

mod aggregator;
mod significance;

pub use aggregator::{EventSummary, ExperimentAggregate, MetricsAggregator, VariantAggregate};
pub use significance::{
    CdfApproximation, Proportion, SignificanceCalculator, SignificanceResult,
};
