//! Adaptive rule evaluation
//!
//! Rules are prioritised condition/action pairs interpreted against a
//! [`RuleContext`] snapshot. The [`RuleEvaluationEngine`] owns the running
//! state, metrics and bounded history the snapshots are built from.
//!
//! ## Evaluation pass
//!
//! ```text
//! snapshot ──> conditions (priority order, same snapshot for all)
//!                 │ true
//!                 ▼
//!          action lists (each sequential, lists run on a bounded pool)
//!                 │
//!                 ▼
//!          merge effects in rule order ──> state / metrics / history
//! ```
//!
//! A failing condition or action only fails its own rule; the pass reports
//! an error only if every evaluated rule failed.
//!
//! ```rust
//! use trueno_adapt::config::EngineConfig;
//! use trueno_adapt::rules::{Action, AdaptationRule, CompareOp, Condition, RuleEvaluationEngine};
//!
//! # async fn example() -> trueno_adapt::Result<()> {
//! let engine = RuleEvaluationEngine::new(EngineConfig::default());
//! engine.register(
//!     AdaptationRule::new("r-1", "degrade-on-low-ctr", Condition::compare("metrics.ctr", CompareOp::Lt, 0.02))
//!         .with_action(Action::SetState { key: "mode".into(), value: "degraded".into() }),
//! )?;
//!
//! engine.update_metrics([("ctr".to_string(), 0.01)]).await;
//! let context = engine.context(None).await;
//! let report = engine.evaluate_triggered(&context).await?;
//! assert_eq!(report.triggered, vec!["degrade-on-low-ctr".to_string()]);
//! # Ok(())
//! # }
//! ```

mod action;
mod condition;
mod context;
mod engine;
mod registry;

pub use action::{Action, ActionHandler, HandlerRegistry};
pub use condition::{CompareOp, Condition, HistoryAggregate};
pub use context::RuleContext;
pub use engine::{EvaluationReport, RuleEvaluationEngine};
pub use registry::RuleRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn enabled_by_default() -> bool {
    true
}

/// A named, prioritised condition/action pair.
///
/// Mirrors the externally stored rule record; lower `priority` values run
/// first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRule {
    /// Stable identifier
    pub id: String,
    /// Unique name
    pub name: String,
    /// Evaluation order (ascending)
    #[serde(default)]
    pub priority: i32,
    /// Disabled rules are skipped
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Trigger predicate
    pub condition: Condition,
    /// Ordered actions run when the condition holds
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Timestamp of the last pass in which the rule fired
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

impl AdaptationRule {
    /// Create an enabled rule with priority 0 and no actions.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, condition: Condition) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority: 0,
            enabled: true,
            condition,
            actions: Vec::new(),
            last_triggered: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Append an action.
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_descriptor_defaults() {
        let rule: AdaptationRule = serde_json::from_value(json!({
            "id": "r-1",
            "name": "always",
            "condition": { "type": "always" }
        }))
        .unwrap();

        assert!(rule.enabled);
        assert_eq!(rule.priority, 0);
        assert!(rule.actions.is_empty());
        assert!(rule.last_triggered.is_none());
    }

    #[test]
    fn test_rule_builder() {
        let rule = AdaptationRule::new("r-2", "signal", Condition::Never)
            .with_priority(7)
            .with_enabled(false)
            .with_action(Action::Signal { name: "x".into(), payload: json!(null) });
        assert_eq!(rule.priority, 7);
        assert!(!rule.enabled);
        assert_eq!(rule.actions.len(), 1);
    }
}
