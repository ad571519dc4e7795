//! Metrics aggregation
//!
//! **Append-only design**: events are recorded as-is and every aggregate is
//! recomputed from the raw events on demand. There are no shared running
//! counters, so unordered concurrent writers cannot cause drift.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::Proportion;
use crate::experiment::{ExperimentStore, MetricEvent};
use crate::{Error, Result};

/// Summary of one event type (or all events) within one variant.
///
/// Every field is zero when no events were observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Number of events
    pub count: u64,
    /// Sum of values
    pub sum: f64,
    /// Mean value
    pub mean: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Distinct subjects that produced the events
    pub distinct_subjects: u64,
}

/// Aggregates of one variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantAggregate {
    /// Summary over all event types
    pub total: EventSummary,
    /// Summary per event type
    pub by_event: BTreeMap<String, EventSummary>,
}

impl VariantAggregate {
    /// Summary for an event type; zero-valued if none were recorded.
    #[must_use]
    pub fn event(&self, event_type: &str) -> EventSummary {
        self.by_event.get(event_type).copied().unwrap_or_default()
    }
}

/// Aggregates of one experiment, keyed by variant ID.
///
/// Every declared variant is present, including those without events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAggregate {
    /// Per-variant aggregates
    pub variants: BTreeMap<String, VariantAggregate>,
}

impl ExperimentAggregate {
    /// Summary for a (variant, event type) pair; zero-valued if absent.
    #[must_use]
    pub fn summary(&self, variant_id: &str, event_type: &str) -> EventSummary {
        self.variants
            .get(variant_id)
            .map(|v| v.event(event_type))
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Accumulator<'a> {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    subjects: FxHashSet<&'a str>,
}

impl<'a> Accumulator<'a> {
    fn push(&mut self, event: &'a MetricEvent) {
        let value = event.value();
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.subjects.insert(event.subject_id());
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&self) -> EventSummary {
        EventSummary {
            count: self.count,
            sum: self.sum,
            mean: if self.count == 0 { 0.0 } else { self.sum / self.count as f64 },
            min: self.min,
            max: self.max,
            distinct_subjects: self.subjects.len() as u64,
        }
    }
}

/// Records raw outcome events and derives per-variant aggregates.
pub struct MetricsAggregator {
    experiments: Arc<ExperimentStore>,
    events: DashMap<String, Vec<MetricEvent>>,
}

impl MetricsAggregator {
    /// Create an aggregator validating references against `experiments`.
    #[must_use]
    pub fn new(experiments: Arc<ExperimentStore>) -> Self {
        Self {
            experiments,
            events: DashMap::new(),
        }
    }

    /// Append an event.
    ///
    /// Only structural validation is performed; values are not range-checked.
    ///
    /// # Errors
    /// Returns [`Error::InvalidReference`] if the experiment or variant is unknown.
    pub fn record(&self, event: MetricEvent) -> Result<()> {
        let experiment = self.experiments.get(event.experiment_id()).ok_or_else(|| {
            Error::InvalidReference(format!("unknown experiment '{}'", event.experiment_id()))
        })?;
        if experiment.variant(event.variant_id()).is_none() {
            return Err(Error::InvalidReference(format!(
                "unknown variant '{}' in experiment '{}'",
                event.variant_id(),
                event.experiment_id()
            )));
        }

        tracing::trace!(
            experiment_id = event.experiment_id(),
            variant_id = event.variant_id(),
            event_type = event.event_type(),
            "recorded metric event"
        );
        self.events
            .entry(event.experiment_id().to_string())
            .or_default()
            .push(event);
        Ok(())
    }

    /// Number of events recorded for an experiment.
    #[must_use]
    pub fn event_count(&self, experiment_id: &str) -> usize {
        self.events.get(experiment_id).map_or(0, |e| e.len())
    }

    /// Snapshot of the raw events of an experiment, in arrival order.
    #[must_use]
    pub fn events(&self, experiment_id: &str) -> Vec<MetricEvent> {
        self.events
            .get(experiment_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Recompute per-variant, per-event-type summaries from raw events.
    ///
    /// # Errors
    /// Returns [`Error::InvalidReference`] if the experiment is unknown.
    pub fn aggregate(&self, experiment_id: &str) -> Result<ExperimentAggregate> {
        let experiment = self.experiments.get(experiment_id).ok_or_else(|| {
            Error::InvalidReference(format!("unknown experiment '{experiment_id}'"))
        })?;
        let events = self.events(experiment_id);

        let mut totals: FxHashMap<&str, Accumulator<'_>> = FxHashMap::default();
        let mut per_type: FxHashMap<(&str, &str), Accumulator<'_>> = FxHashMap::default();
        for event in &events {
            totals.entry(event.variant_id()).or_default().push(event);
            per_type
                .entry((event.variant_id(), event.event_type()))
                .or_default()
                .push(event);
        }

        let mut aggregate = ExperimentAggregate::default();
        for variant in experiment.variants() {
            let total = totals
                .get(variant.id())
                .map(Accumulator::finish)
                .unwrap_or_default();
            aggregate.variants.insert(
                variant.id().to_string(),
                VariantAggregate {
                    total,
                    by_event: BTreeMap::new(),
                },
            );
        }
        for ((variant_id, event_type), acc) in &per_type {
            if let Some(entry) = aggregate.variants.get_mut(*variant_id) {
                entry.by_event.insert((*event_type).to_string(), acc.finish());
            }
        }
        Ok(aggregate)
    }

    /// Conversion proportions per variant: trials are distinct subjects with
    /// any event, successes are distinct subjects with a `conversion_event`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidReference`] if the experiment is unknown.
    pub fn proportions(&self, experiment_id: &str, conversion_event: &str) -> Result<BTreeMap<String, Proportion>> {
        let aggregate = self.aggregate(experiment_id)?;
        Ok(aggregate
            .variants
            .into_iter()
            .map(|(variant_id, agg)| {
                let proportion = Proportion::new(
                    agg.event(conversion_event).distinct_subjects,
                    agg.total.distinct_subjects,
                );
                (variant_id, proportion)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{Experiment, Variant};

    fn aggregator() -> MetricsAggregator {
        let store = Arc::new(ExperimentStore::new());
        store
            .create(
                Experiment::builder("exp-1", "Test")
                    .variant(Variant::new("a", "A", 0.5))
                    .variant(Variant::new("b", "B", 0.5))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        MetricsAggregator::new(store)
    }

    #[test]
    fn test_aggregate_zero_events() {
        let agg = aggregator();
        let result = agg.aggregate("exp-1").unwrap();

        assert_eq!(result.variants.len(), 2);
        let summary = result.summary("a", "click");
        assert_eq!(summary, EventSummary::default());
        assert_eq!(result.variants["b"].total.count, 0);
        assert!(result.variants["b"].total.mean.abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_summaries() {
        let agg = aggregator();
        agg.record(MetricEvent::new("exp-1", "a", "u1", "dwell", 10.0)).unwrap();
        agg.record(MetricEvent::new("exp-1", "a", "u1", "dwell", 30.0)).unwrap();
        agg.record(MetricEvent::new("exp-1", "a", "u2", "dwell", -5.0)).unwrap();
        agg.record(MetricEvent::new("exp-1", "b", "u3", "click", 1.0)).unwrap();

        let result = agg.aggregate("exp-1").unwrap();
        let dwell = result.summary("a", "dwell");
        assert_eq!(dwell.count, 3);
        assert!((dwell.sum - 35.0).abs() < 1e-9);
        assert!((dwell.mean - 35.0 / 3.0).abs() < 1e-9);
        assert!((dwell.min + 5.0).abs() < 1e-9);
        assert!((dwell.max - 30.0).abs() < 1e-9);
        assert_eq!(dwell.distinct_subjects, 2);
        assert_eq!(result.variants["b"].total.count, 1);
        assert_eq!(result.summary("b", "dwell").count, 0);
    }

    #[test]
    fn test_record_unknown_references() {
        let agg = aggregator();
        assert!(matches!(
            agg.record(MetricEvent::new("exp-x", "a", "u1", "click", 1.0)),
            Err(Error::InvalidReference(_))
        ));
        assert!(matches!(
            agg.record(MetricEvent::new("exp-1", "zzz", "u1", "click", 1.0)),
            Err(Error::InvalidReference(_))
        ));
        assert!(matches!(agg.aggregate("exp-x"), Err(Error::InvalidReference(_))));
        assert_eq!(agg.event_count("exp-1"), 0);
    }

    #[test]
    fn test_proportions_count_distinct_subjects() {
        let agg = aggregator();
        for subject in ["u1", "u2", "u3", "u4"] {
            agg.record(MetricEvent::new("exp-1", "a", subject, "exposure", 1.0)).unwrap();
        }
        // u1 converts twice, still one success
        agg.record(MetricEvent::new("exp-1", "a", "u1", "conversion", 1.0)).unwrap();
        agg.record(MetricEvent::new("exp-1", "a", "u1", "conversion", 1.0)).unwrap();

        let proportions = agg.proportions("exp-1", "conversion").unwrap();
        assert_eq!(proportions["a"], Proportion::new(1, 4));
        assert_eq!(proportions["b"], Proportion::new(0, 0));
    }

    #[test]
    fn test_concurrent_writers_no_drift() {
        let agg = Arc::new(aggregator());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let variant = if i % 2 == 0 { "a" } else { "b" };
                        agg.record(MetricEvent::new("exp-1", variant, format!("u{t}-{i}"), "click", 1.0))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let result = agg.aggregate("exp-1").unwrap();
        assert_eq!(result.variants["a"].total.count + result.variants["b"].total.count, 2000);
        assert_eq!(result.summary("a", "click").distinct_subjects, 1000);
    }
}
