//! Condition AST
//!
//! Conditions are data, not code: they are loaded from the rule descriptors
//! the persistence layer stores and interpreted against a [`RuleContext`].
//!
//! ```rust
//! use trueno_adapt::rules::{CompareOp, Condition};
//!
//! let condition: Condition = serde_json::from_value(serde_json::json!({
//!     "type": "and",
//!     "conditions": [
//!         { "type": "compare", "path": "metrics.ctr", "op": "lt", "value": 0.05 },
//!         { "type": "compare", "path": "state.mode", "op": "eq", "value": "normal" }
//!     ]
//! }))?;
//! assert_eq!(
//!     condition,
//!     Condition::and(vec![
//!         Condition::compare("metrics.ctr", CompareOp::Lt, 0.05),
//!         Condition::compare("state.mode", CompareOp::Eq, "normal"),
//!     ])
//! );
//! # Ok::<(), serde_json::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RuleContext;
use crate::patterns::PatternKind;
use crate::{Error, Result};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Equal
    Eq,
    /// Not equal
    Ne,
}

impl CompareOp {
    /// Apply to two numbers.
    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Eq => (left - right).abs() <= f64::EPSILON * left.abs().max(right.abs()).max(1.0),
            Self::Ne => !Self::Eq.apply(left, right),
        }
    }

    /// Apply to two JSON values. Equality works on any values; ordering
    /// requires both sides to be numbers.
    ///
    /// # Errors
    /// Returns [`Error::Computation`] when ordering non-numeric values.
    pub fn apply_values(self, left: &Value, right: &Value) -> Result<bool> {
        if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
            return Ok(self.apply(l, r));
        }
        match self {
            Self::Eq => Ok(left == right),
            Self::Ne => Ok(left != right),
            _ => Err(Error::Computation(format!(
                "cannot apply {self:?} to non-numeric values {left} and {right}"
            ))),
        }
    }
}

/// Reduction applied to a metric's history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAggregate {
    /// Arithmetic mean
    Avg,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Sum of values
    Sum,
    /// Last value minus first value
    Delta,
    /// Number of points
    Count,
}

impl HistoryAggregate {
    #[allow(clippy::cast_precision_loss)]
    fn reduce(self, values: &[f64]) -> f64 {
        match self {
            Self::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Sum => values.iter().sum(),
            Self::Delta => values[values.len() - 1] - values[0],
            Self::Count => values.len() as f64,
        }
    }
}

fn default_min_confidence() -> f64 {
    0.0
}

/// Predicate over a [`RuleContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Always true.
    Always,
    /// Always false.
    Never,
    /// Compare the value at `path` with a literal. Missing paths are false.
    Compare {
        /// Dotted path, see [`RuleContext::resolve`]
        path: String,
        /// Operator
        op: CompareOp,
        /// Literal right-hand side
        value: Value,
    },
    /// True when `path` resolves.
    Exists {
        /// Dotted path
        path: String,
    },
    /// All children true. Empty is true.
    And {
        /// Children
        conditions: Vec<Condition>,
    },
    /// Any child true. Empty is false.
    Or {
        /// Children
        conditions: Vec<Condition>,
    },
    /// Negation.
    Not {
        /// Negated child
        condition: Box<Condition>,
    },
    /// Reduce the last `window` points of a metric's history (0 = all kept
    /// points) and compare. An empty history is false.
    History {
        /// Metric key
        metric: String,
        /// Number of most recent points
        #[serde(default)]
        window: usize,
        /// Reduction
        aggregate: HistoryAggregate,
        /// Operator
        op: CompareOp,
        /// Threshold
        value: f64,
    },
    /// A pattern in the snapshot matches the filters with enough confidence.
    Pattern {
        /// Pattern type tag filter
        #[serde(default)]
        kind: Option<PatternKind>,
        /// Pattern key filter
        #[serde(default)]
        key: Option<String>,
        /// Minimum confidence
        #[serde(default = "default_min_confidence")]
        min_confidence: f64,
    },
    /// A signal with this name is in the snapshot.
    Signaled {
        /// Signal name
        name: String,
    },
}

impl Condition {
    /// Shorthand for [`Condition::Compare`].
    #[must_use]
    pub fn compare(path: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for [`Condition::And`].
    #[must_use]
    pub const fn and(conditions: Vec<Self>) -> Self {
        Self::And { conditions }
    }

    /// Shorthand for [`Condition::Or`].
    #[must_use]
    pub const fn or(conditions: Vec<Self>) -> Self {
        Self::Or { conditions }
    }

    /// Shorthand for [`Condition::Not`].
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Self) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Evaluate against a snapshot.
    ///
    /// # Errors
    /// Returns [`Error::Computation`] for ordering comparisons on
    /// non-numeric values.
    pub fn evaluate(&self, ctx: &RuleContext) -> Result<bool> {
        match self {
            Self::Always => Ok(true),
            Self::Never => Ok(false),
            Self::Compare { path, op, value } => match ctx.resolve(path) {
                Some(actual) => op.apply_values(&actual, value),
                None => Ok(false),
            },
            Self::Exists { path } => Ok(ctx.resolve(path).is_some()),
            Self::And { conditions } => {
                for condition in conditions {
                    if !condition.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or { conditions } => {
                for condition in conditions {
                    if condition.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not { condition } => Ok(!condition.evaluate(ctx)?),
            Self::History {
                metric,
                window,
                aggregate,
                op,
                value,
            } => {
                let points = ctx.metric_history(metric);
                if points.is_empty() {
                    return Ok(false);
                }
                let start = if *window == 0 {
                    0
                } else {
                    points.len().saturating_sub(*window)
                };
                let values: Vec<f64> = points[start..].iter().map(|(_, v)| *v).collect();
                Ok(op.apply(aggregate.reduce(&values), *value))
            }
            Self::Pattern {
                kind,
                key,
                min_confidence,
            } => Ok(ctx.patterns().iter().any(|p| {
                kind.map_or(true, |k| p.kind() == k)
                    && key.as_deref().map_or(true, |k| p.key() == k)
                    && p.confidence() >= *min_confidence
            })),
            Self::Signaled { name } => Ok(ctx.signals().iter().any(|s| s.name == *name)),
        }
    }
}
