//! Metric Event - append-only outcome observations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single outcome observation for a subject exposed to a variant.
///
/// Events are append-only and never mutated. Aggregates are always derived
/// from the raw events, so concurrent writers never race on counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricEvent {
    experiment_id: String,
    variant_id: String,
    subject_id: String,
    event_type: String,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricEvent {
    /// Create a new metric event stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - Experiment the subject was exposed to
    /// * `variant_id` - Variant the subject was assigned
    /// * `subject_id` - Unit of randomization (session or user)
    /// * `event_type` - Label such as "click" or "conversion"
    /// * `value` - Numeric payload (1.0 for plain occurrences)
    #[must_use]
    pub fn new(
        experiment_id: impl Into<String>,
        variant_id: impl Into<String>,
        subject_id: impl Into<String>,
        event_type: impl Into<String>,
        value: f64,
    ) -> Self {
        Self::builder(experiment_id, variant_id, subject_id, event_type, value).build()
    }

    /// Create a builder for constructing an event with optional fields.
    #[must_use]
    pub fn builder(
        experiment_id: impl Into<String>,
        variant_id: impl Into<String>,
        subject_id: impl Into<String>,
        event_type: impl Into<String>,
        value: f64,
    ) -> MetricEventBuilder {
        MetricEventBuilder {
            experiment_id: experiment_id.into(),
            variant_id: variant_id.into(),
            subject_id: subject_id.into(),
            event_type: event_type.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the variant ID.
    #[must_use]
    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    /// Get the subject ID.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Get the event type label.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Get the numeric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the event was observed.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Builder for `MetricEvent`.
#[derive(Debug)]
pub struct MetricEventBuilder {
    experiment_id: String,
    variant_id: String,
    subject_id: String,
    event_type: String,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricEventBuilder {
    /// Set a custom timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Build the `MetricEvent`.
    #[must_use]
    pub fn build(self) -> MetricEvent {
        MetricEvent {
            experiment_id: self.experiment_id,
            variant_id: self.variant_id,
            subject_id: self.subject_id,
            event_type: self.event_type,
            value: self.value,
            timestamp: self.timestamp,
        }
    }
}
