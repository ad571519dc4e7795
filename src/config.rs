//! Runtime configuration
//!
//! Every tunable constant of the subsystem lives here so deployments can
//! override them from a JSON document. Unspecified fields fall back to
//! [`Default`], which carries the conventional values (alpha = 0.05,
//! z = 1.96, 100-entry history windows).
//!
//! ```rust
//! use trueno_adapt::config::{AdaptConfig, AssignmentStrategy};
//!
//! let config = AdaptConfig::from_json_str(r#"{
//!     "assignment": { "strategy": "weighted_random" },
//!     "engine": { "history_window": 50 }
//! }"#)?;
//! assert_eq!(config.assignment.strategy, AssignmentStrategy::WeightedRandom);
//! assert_eq!(config.engine.history_window, 50);
//! assert!((config.significance.alpha - 0.05).abs() < f64::EPSILON);
//! # Ok::<(), trueno_adapt::Error>(())
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metrics::CdfApproximation;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptConfig {
    /// Significance test parameters
    pub significance: SignificanceConfig,
    /// Variant assignment parameters
    pub assignment: AssignmentConfig,
    /// Rule engine parameters
    pub engine: EngineConfig,
    /// Pattern detection parameters
    pub patterns: PatternConfig,
    /// Metric interpretation parameters
    pub metrics: MetricsConfig,
}

/// Two-proportion z-test parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceConfig {
    /// p-value threshold below which a difference is significant
    pub alpha: f64,
    /// Critical z used for the confidence interval half-width
    pub z_critical: f64,
    /// Approximation used for the standard normal CDF
    pub cdf: CdfApproximation,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            z_critical: 1.96,
            cdf: CdfApproximation::default(),
        }
    }
}

/// How first-touch assignments are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// SHA-256 bucketing of `"<experiment>:<subject>"` (stable across restarts)
    #[default]
    Deterministic,
    /// Uniform draw against the cumulative allocation, persisted on first touch
    WeightedRandom,
}

/// Variant assignment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Strategy for new assignments
    pub strategy: AssignmentStrategy,
    /// Accepted deviation of the allocation sum from 1.0
    pub allocation_tolerance: f64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            strategy: AssignmentStrategy::Deterministic,
            allocation_tolerance: 1e-3,
        }
    }
}

/// Rule engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum entries kept per metric series, event history and pattern history
    pub history_window: usize,
    /// Period of the continuous evaluation loop
    pub evaluation_interval_ms: u64,
    /// Upper bound on rule action lists executing at the same time
    pub max_concurrent_actions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window: 100,
            evaluation_interval_ms: 60_000,
            max_concurrent_actions: 4,
        }
    }
}

impl EngineConfig {
    /// Evaluation interval as a [`Duration`].
    #[must_use]
    pub const fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }
}

/// Pattern detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Occurrence count at which the frequency weight saturates at 1.0
    pub frequency_norm: f64,
    /// Distinct subjects at which the breadth weight saturates at 1.0
    pub breadth_norm: f64,
    /// Minimum occurrences before a group is reported as a pattern
    pub min_support: usize,
    /// Patterns below this confidence are discarded
    pub min_confidence: f64,
    /// Minimum points in a metric series before a trend is reported
    pub trend_min_points: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            frequency_norm: 10.0,
            breadth_norm: 5.0,
            min_support: 2,
            min_confidence: 0.0,
            trend_min_points: 3,
        }
    }
}

/// Metric interpretation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Event type counted as a success when computing conversion rates
    pub conversion_event: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            conversion_event: "conversion".to_string(),
        }
    }
}

impl AdaptConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// Returns [`Error::Json`] on malformed input and [`Error::Configuration`]
    /// if a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`AdaptConfig::from_json_str`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let alpha = self.significance.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::Configuration(format!(
                "significance.alpha must lie in (0, 1), got {alpha}"
            )));
        }
        if !(self.significance.z_critical.is_finite() && self.significance.z_critical > 0.0) {
            return Err(Error::Configuration(
                "significance.z_critical must be a positive finite number".to_string(),
            ));
        }
        if !(self.assignment.allocation_tolerance >= 0.0 && self.assignment.allocation_tolerance < 1.0) {
            return Err(Error::Configuration(
                "assignment.allocation_tolerance must lie in [0, 1)".to_string(),
            ));
        }
        if self.engine.history_window == 0 {
            return Err(Error::Configuration(
                "engine.history_window must be at least 1".to_string(),
            ));
        }
        if self.engine.evaluation_interval_ms == 0 {
            return Err(Error::Configuration(
                "engine.evaluation_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.engine.max_concurrent_actions == 0 {
            return Err(Error::Configuration(
                "engine.max_concurrent_actions must be at least 1".to_string(),
            ));
        }
        if !(self.patterns.frequency_norm > 0.0 && self.patterns.breadth_norm > 0.0) {
            return Err(Error::Configuration(
                "patterns.frequency_norm and patterns.breadth_norm must be positive".to_string(),
            ));
        }
        if self.metrics.conversion_event.is_empty() {
            return Err(Error::Configuration(
                "metrics.conversion_event must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
