//! Bounded history buffers
//!
//! The rule engine keeps a short memory of what it has seen: a time series
//! per metric key, recent event payloads, derived patterns and the signals
//! rules emitted. Every buffer holds at most `window` entries and evicts the
//! oldest first.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::patterns::Pattern;

/// One observation of a metric.
pub type MetricPoint = (DateTime<Utc>, f64);

/// An event payload seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEvent {
    /// When the event was observed
    pub timestamp: DateTime<Utc>,
    /// Opaque payload
    pub payload: serde_json::Value,
}

/// A named observation emitted by a rule action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal name
    pub name: String,
    /// Rule that emitted it
    pub rule: String,
    /// Attached data
    pub payload: serde_json::Value,
    /// Evaluation timestamp of the emitting pass
    pub timestamp: DateTime<Utc>,
}

/// Bounded history buffers owned by one engine instance.
#[derive(Debug, Clone)]
pub struct History {
    window: usize,
    metrics: BTreeMap<String, VecDeque<MetricPoint>>,
    events: VecDeque<ContextEvent>,
    patterns: VecDeque<Pattern>,
    signals: VecDeque<Signal>,
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, window: usize, item: T) {
    buffer.push_back(item);
    while buffer.len() > window {
        buffer.pop_front();
    }
}

impl History {
    /// Create empty buffers holding at most `window` entries each (minimum 1).
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            metrics: BTreeMap::new(),
            events: VecDeque::new(),
            patterns: VecDeque::new(),
            signals: VecDeque::new(),
        }
    }

    /// Capacity of each buffer.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Append a metric observation.
    pub fn push_metric(&mut self, key: &str, at: DateTime<Utc>, value: f64) {
        let series = self.metrics.entry(key.to_string()).or_default();
        push_bounded(series, self.window, (at, value));
    }

    /// Append an event payload.
    pub fn push_event(&mut self, event: ContextEvent) {
        push_bounded(&mut self.events, self.window, event);
    }

    /// Record a derived pattern and return the stored copy.
    ///
    /// A pattern already held with the same kind and key is refreshed in
    /// place and moved to the newest slot instead of being duplicated.
    pub fn upsert_pattern(&mut self, pattern: Pattern) -> Pattern {
        let existing = self
            .patterns
            .iter()
            .position(|p| p.kind() == pattern.kind() && p.key() == pattern.key())
            .and_then(|index| self.patterns.remove(index));
        let stored = match existing {
            Some(mut existing) => {
                existing.refresh(pattern);
                existing
            }
            None => pattern,
        };
        push_bounded(&mut self.patterns, self.window, stored.clone());
        stored
    }

    /// Append an emitted signal.
    pub fn push_signal(&mut self, signal: Signal) {
        push_bounded(&mut self.signals, self.window, signal);
    }

    /// Series for one metric key, oldest first.
    #[must_use]
    pub fn series(&self, key: &str) -> Option<&VecDeque<MetricPoint>> {
        self.metrics.get(key)
    }

    /// All metric series, by key.
    pub fn metric_series(&self) -> impl Iterator<Item = (&str, &VecDeque<MetricPoint>)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Recent events, oldest first.
    #[must_use]
    pub const fn events(&self) -> &VecDeque<ContextEvent> {
        &self.events
    }

    /// Recent patterns, oldest first.
    #[must_use]
    pub const fn patterns(&self) -> &VecDeque<Pattern> {
        &self.patterns
    }

    /// Recent signals, oldest first.
    #[must_use]
    pub const fn signals(&self) -> &VecDeque<Signal> {
        &self.signals
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::default().history_window)
    }
}
