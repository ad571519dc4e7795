//! Pattern detection
//!
//! Derives confidence-scored observations from recent events and metric
//! history. Patterns are fed back into the rule engine's history so later
//! rule contexts can react to them.
//!
//! ## Confidence
//!
//! ```text
//! frequency = min(occurrences / frequency_norm, 1)
//! breadth   = min(distinct_subjects / breadth_norm, 1)
//! confidence = (frequency + breadth) / 2
//! ```

mod detector;

pub use detector::PatternDetector;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type tag of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// An event type recurring across subjects.
    Frequency,
    /// A metric series moving consistently upwards.
    RisingTrend,
    /// A metric series moving consistently downwards.
    FallingTrend,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Frequency => "frequency",
            Self::RisingTrend => "rising_trend",
            Self::FallingTrend => "falling_trend",
        };
        f.write_str(tag)
    }
}

/// A derived observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    id: Uuid,
    kind: PatternKind,
    key: String,
    confidence: f64,
    features: BTreeMap<String, f64>,
    source: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Create a pattern. `confidence` is clamped into [0, 1].
    #[must_use]
    pub fn new(kind: PatternKind, key: impl Into<String>, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            key: key.into(),
            confidence: if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) },
            features: BTreeMap::new(),
            source: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a numeric feature.
    #[must_use]
    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    /// Reference the observation the pattern was derived from.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Fold a fresh observation of the same kind and key into this record.
    /// The ID and creation time are kept.
    pub fn refresh(&mut self, observed: Self) {
        self.confidence = observed.confidence;
        self.features = observed.features;
        if observed.source.is_some() {
            self.source = observed.source;
        }
        self.updated_at = observed.updated_at.max(self.updated_at);
    }

    /// Get the pattern ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Get the type tag.
    #[must_use]
    pub const fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Get the subject key (event group or metric name).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the confidence in [0, 1].
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Get the feature map.
    #[must_use]
    pub const fn features(&self) -> &BTreeMap<String, f64> {
        &self.features
    }

    /// Get a single feature.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    /// Get the originating observation reference, if any.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        assert!((Pattern::new(PatternKind::Frequency, "k", 1.7).confidence() - 1.0).abs() < f64::EPSILON);
        assert!(Pattern::new(PatternKind::Frequency, "k", -0.2).confidence().abs() < f64::EPSILON);
        assert!(Pattern::new(PatternKind::Frequency, "k", f64::NAN).confidence().abs() < f64::EPSILON);
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(PatternKind::RisingTrend.to_string(), "rising_trend");
        assert_eq!(
            serde_json::to_value(PatternKind::FallingTrend).unwrap(),
            serde_json::json!("falling_trend")
        );
    }

    #[test]
    fn test_features_and_source() {
        let pattern = Pattern::new(PatternKind::Frequency, "exp-1/click", 0.5)
            .with_feature("occurrences", 4.0)
            .with_source("exp-1/a/u1");
        assert_eq!(pattern.feature("occurrences"), Some(4.0));
        assert_eq!(pattern.source(), Some("exp-1/a/u1"));
        assert_eq!(pattern.created_at(), pattern.updated_at());
    }

    #[test]
    fn test_refresh_keeps_identity() {
        let mut stored = Pattern::new(PatternKind::Frequency, "exp-1/click", 0.2).with_feature("occurrences", 2.0);
        let id = stored.id();
        let created = stored.created_at();

        let observed = Pattern::new(PatternKind::Frequency, "exp-1/click", 0.6).with_feature("occurrences", 6.0);
        let observed_at = observed.updated_at();
        stored.refresh(observed);

        assert_eq!(stored.id(), id);
        assert_eq!(stored.created_at(), created);
        assert!(stored.updated_at() >= observed_at);
        assert!((stored.confidence() - 0.6).abs() < f64::EPSILON);
        assert_eq!(stored.feature("occurrences"), Some(6.0));
    }
}
