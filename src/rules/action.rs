//! Action AST and handlers
//!
//! Built-in actions only describe effects (state/metric updates, signals);
//! the engine merges those after the pass. `Invoke` hands control to a named
//! [`ActionHandler`] registered by the host, which is where side effects on
//! the outside world live (reindexing, cache flushes, notifications).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RuleContext;
use crate::history::Signal;
use crate::{Error, Result};

/// One step of a rule's ordered action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Set a state entry.
    SetState {
        /// State key
        key: String,
        /// New value
        value: Value,
    },
    /// Set a metric.
    SetMetric {
        /// Metric key
        key: String,
        /// New value
        value: f64,
    },
    /// Add to a metric (missing metrics start at 0).
    IncrementMetric {
        /// Metric key
        key: String,
        /// Increment
        by: f64,
    },
    /// Emit a named signal into the engine's history.
    Signal {
        /// Signal name
        name: String,
        /// Attached data
        #[serde(default)]
        payload: Value,
    },
    /// Call a registered handler.
    Invoke {
        /// Handler name
        handler: String,
        /// Handler parameters
        #[serde(default)]
        params: Value,
    },
}

/// Host-provided implementation of an `Invoke` action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action for `rule` with the descriptor's `params`.
    async fn handle(&self, rule: &str, params: &Value, context: &RuleContext) -> anyhow::Result<()>;
}

/// Named handlers shared between the engine and its action tasks.
pub type HandlerRegistry = DashMap<String, Arc<dyn ActionHandler>>;

/// Metric change produced by an action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetricEffect {
    Set(String, f64),
    Increment(String, f64),
}

/// Effects collected from one rule's action list.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub(crate) state: Vec<(String, Value)>,
    pub(crate) metrics: Vec<MetricEffect>,
    pub(crate) signals: Vec<Signal>,
}

/// Run a rule's actions in order, stopping at the first failure.
///
/// Effects of the actions that completed before a failure are kept.
pub(crate) async fn run_actions(
    rule: &str,
    actions: &[Action],
    context: &RuleContext,
    handlers: &HandlerRegistry,
    timestamp: DateTime<Utc>,
) -> (Effects, Option<Error>) {
    let mut effects = Effects::default();
    for (index, action) in actions.iter().enumerate() {
        match action {
            Action::SetState { key, value } => effects.state.push((key.clone(), value.clone())),
            Action::SetMetric { key, value } => {
                effects.metrics.push(MetricEffect::Set(key.clone(), *value));
            }
            Action::IncrementMetric { key, by } => {
                effects.metrics.push(MetricEffect::Increment(key.clone(), *by));
            }
            Action::Signal { name, payload } => effects.signals.push(Signal {
                name: name.clone(),
                rule: rule.to_string(),
                payload: payload.clone(),
                timestamp,
            }),
            Action::Invoke { handler, params } => {
                // Clone out of the map so no shard lock is held across the await
                let Some(target) = handlers.get(handler).map(|h| Arc::clone(h.value())) else {
                    return (
                        effects,
                        Some(Error::RuleFailed {
                            rule: rule.to_string(),
                            reason: format!("action {index}: no handler named '{handler}'"),
                        }),
                    );
                };
                if let Err(e) = target.handle(rule, params, context).await {
                    return (
                        effects,
                        Some(Error::RuleFailed {
                            rule: rule.to_string(),
                            reason: format!("action {index} ({handler}): {e:#}"),
                        }),
                    );
                }
            }
        }
    }
    (effects, None)
}
