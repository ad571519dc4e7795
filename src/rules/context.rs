//! Rule context - the read-only snapshot one evaluation pass sees

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::history::{ContextEvent, History, MetricPoint, Signal};
use crate::patterns::Pattern;

/// Snapshot of state, metrics and bounded history for one evaluation pass.
///
/// Conditions address values with dotted paths:
///
/// | Path | Resolves to |
/// |---|---|
/// | `metrics.<key>` | current metric value |
/// | `state.<key>[.<field>...]` | state entry, then nested JSON fields |
/// | `event.<field>[...]` | incoming event payload fields |
///
/// A key containing dots is matched whole before nested lookup is tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleContext {
    timestamp: DateTime<Utc>,
    event: Option<Value>,
    #[serde(default)]
    state: Map<String, Value>,
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
    #[serde(default)]
    metric_history: BTreeMap<String, Vec<MetricPoint>>,
    #[serde(default)]
    event_history: Vec<ContextEvent>,
    #[serde(default)]
    patterns: Vec<Pattern>,
    #[serde(default)]
    signals: Vec<Signal>,
}

impl RuleContext {
    /// Empty context at `timestamp`.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            event: None,
            state: Map::new(),
            metrics: BTreeMap::new(),
            metric_history: BTreeMap::new(),
            event_history: Vec::new(),
            patterns: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Snapshot engine state and history.
    pub(crate) fn from_parts(
        timestamp: DateTime<Utc>,
        event: Option<Value>,
        state: &Map<String, Value>,
        metrics: &BTreeMap<String, f64>,
        history: &History,
    ) -> Self {
        Self {
            timestamp,
            event,
            state: state.clone(),
            metrics: metrics.clone(),
            metric_history: history
                .metric_series()
                .map(|(k, v)| (k.to_string(), v.iter().copied().collect()))
                .collect(),
            event_history: history.events().iter().cloned().collect(),
            patterns: history.patterns().iter().cloned().collect(),
            signals: history.signals().iter().cloned().collect(),
        }
    }

    /// Attach the incoming event payload.
    #[must_use]
    pub fn with_event(mut self, event: Value) -> Self {
        self.event = Some(event);
        self
    }

    /// Set one state entry.
    #[must_use]
    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    /// Set one metric value.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Set the history of one metric, oldest first.
    #[must_use]
    pub fn with_metric_history(mut self, key: impl Into<String>, points: Vec<MetricPoint>) -> Self {
        self.metric_history.insert(key.into(), points);
        self
    }

    /// Add a pattern to the snapshot.
    #[must_use]
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Evaluation timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Incoming event payload.
    #[must_use]
    pub const fn event(&self) -> Option<&Value> {
        self.event.as_ref()
    }

    /// Current state map.
    #[must_use]
    pub const fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Current metric map.
    #[must_use]
    pub const fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    /// Current value of a metric.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    /// History of one metric, oldest first.
    #[must_use]
    pub fn metric_history(&self, key: &str) -> &[MetricPoint] {
        self.metric_history
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Recent events, oldest first.
    #[must_use]
    pub fn event_history(&self) -> &[ContextEvent] {
        &self.event_history
    }

    /// Recent patterns, oldest first.
    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Recent signals, oldest first.
    #[must_use]
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Resolve a dotted path. Returns `None` when any segment is missing.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<Value> {
        let (root, rest) = path.split_once('.').unwrap_or((path, ""));
        match root {
            "metrics" => self.metric(rest).map(Value::from),
            "state" => {
                if let Some(value) = self.state.get(rest) {
                    return Some(value.clone());
                }
                let (key, nested) = rest.split_once('.')?;
                descend(self.state.get(key)?, nested).cloned()
            }
            "event" => {
                let event = self.event.as_ref()?;
                if rest.is_empty() {
                    Some(event.clone())
                } else {
                    descend(event, rest).cloned()
                }
            }
            _ => None,
        }
    }
}

fn descend<'a>(mut value: &'a Value, path: &str) -> Option<&'a Value> {
    for segment in path.split('.') {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RuleContext {
        RuleContext::new(Utc::now())
            .with_metric("ctr", 0.12)
            .with_metric("search.latency_p95", 310.0)
            .with_state("mode", json!("normal"))
            .with_state("limits", json!({ "qps": 50, "tiers": [1, 2, 3] }))
            .with_event(json!({ "type": "query", "meta": { "results": 0 } }))
    }

    #[test]
    fn test_resolve_metrics() {
        let ctx = context();
        assert_eq!(ctx.resolve("metrics.ctr"), Some(json!(0.12)));
        assert_eq!(ctx.resolve("metrics.search.latency_p95"), Some(json!(310.0)));
        assert_eq!(ctx.resolve("metrics.missing"), None);
    }

    #[test]
    fn test_resolve_state_nested() {
        let ctx = context();
        assert_eq!(ctx.resolve("state.mode"), Some(json!("normal")));
        assert_eq!(ctx.resolve("state.limits.qps"), Some(json!(50)));
        assert_eq!(ctx.resolve("state.limits.tiers.2"), Some(json!(3)));
        assert_eq!(ctx.resolve("state.limits.burst"), None);
    }

    #[test]
    fn test_resolve_event() {
        let ctx = context();
        assert_eq!(ctx.resolve("event.type"), Some(json!("query")));
        assert_eq!(ctx.resolve("event.meta.results"), Some(json!(0)));
        assert!(RuleContext::new(Utc::now()).resolve("event.type").is_none());
    }

    #[test]
    fn test_resolve_unknown_root() {
        assert_eq!(context().resolve("nowhere.ctr"), None);
    }

    #[test]
    fn test_metric_history_default_empty() {
        assert!(context().metric_history("ctr").is_empty());
    }
}
