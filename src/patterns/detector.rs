//! Pattern detector

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::{Pattern, PatternKind};
use crate::config::PatternConfig;
use crate::experiment::MetricEvent;
use crate::history::MetricPoint;

/// Stateless detector; the caller decides where derived patterns are kept.
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: PatternConfig,
}

#[derive(Default)]
struct Group<'a> {
    occurrences: usize,
    value_sum: f64,
    subjects: BTreeSet<&'a str>,
    variants: BTreeSet<&'a str>,
    last: Option<&'a MetricEvent>,
}

impl PatternDetector {
    /// Create a detector with the given thresholds.
    #[must_use]
    pub const fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Detector thresholds.
    #[must_use]
    pub const fn config(&self) -> &PatternConfig {
        &self.config
    }

    #[allow(clippy::cast_precision_loss)]
    fn confidence(&self, occurrences: usize, breadth: usize) -> (f64, f64, f64) {
        let frequency = (occurrences as f64 / self.config.frequency_norm).min(1.0);
        let breadth = (breadth as f64 / self.config.breadth_norm).min(1.0);
        (frequency, breadth, (frequency + breadth) / 2.0)
    }

    /// Derive frequency patterns from a batch of events.
    ///
    /// Events are grouped by (experiment, event type); each group with at
    /// least `min_support` occurrences yields one pattern keyed
    /// `"<experiment>/<event type>"`. Output is ordered by key. An empty
    /// batch yields no patterns.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn detect(&self, events: &[MetricEvent]) -> Vec<Pattern> {
        if events.is_empty() {
            return Vec::new();
        }

        let mut groups: BTreeMap<(&str, &str), Group<'_>> = BTreeMap::new();
        for event in events {
            let group = groups
                .entry((event.experiment_id(), event.event_type()))
                .or_default();
            group.occurrences += 1;
            group.value_sum += event.value();
            group.subjects.insert(event.subject_id());
            group.variants.insert(event.variant_id());
            if group.last.map_or(true, |last| event.timestamp() >= last.timestamp()) {
                group.last = Some(event);
            }
        }

        let mut patterns = Vec::new();
        for ((experiment_id, event_type), group) in groups {
            if group.occurrences < self.config.min_support {
                continue;
            }
            let (frequency, breadth, confidence) =
                self.confidence(group.occurrences, group.subjects.len());
            if confidence < self.config.min_confidence {
                continue;
            }

            let mut pattern = Pattern::new(
                PatternKind::Frequency,
                format!("{experiment_id}/{event_type}"),
                confidence,
            )
            .with_feature("occurrences", group.occurrences as f64)
            .with_feature("distinct_subjects", group.subjects.len() as f64)
            .with_feature("distinct_variants", group.variants.len() as f64)
            .with_feature("mean_value", group.value_sum / group.occurrences as f64)
            .with_feature("frequency_weight", frequency)
            .with_feature("breadth_weight", breadth);
            if let Some(last) = group.last {
                pattern = pattern.with_source(format!(
                    "{}/{}/{}@{}",
                    last.experiment_id(),
                    last.variant_id(),
                    last.subject_id(),
                    last.timestamp().to_rfc3339()
                ));
            }
            patterns.push(pattern);
        }

        tracing::debug!(events = events.len(), patterns = patterns.len(), "detected frequency patterns");
        patterns
    }

    /// Derive trend patterns from metric series.
    ///
    /// A series with at least `trend_min_points` points and a non-zero
    /// least-squares slope yields a rising or falling trend. Confidence
    /// averages the saturating point-count weight with the share of steps
    /// that move in the slope's direction.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn detect_trends<'a, I>(&self, series: I) -> Vec<Pattern>
    where
        I: IntoIterator<Item = (&'a str, &'a VecDeque<MetricPoint>)>,
    {
        let mut patterns = Vec::new();
        for (key, points) in series {
            let n = points.len();
            if n < self.config.trend_min_points.max(2) {
                continue;
            }

            let slope = least_squares_slope(points);
            if !slope.is_finite() || slope == 0.0 {
                continue;
            }
            let rising = slope > 0.0;
            let agreeing = points
                .iter()
                .zip(points.iter().skip(1))
                .filter(|((_, a), (_, b))| if rising { b > a } else { b < a })
                .count();

            let frequency = (n as f64 / self.config.frequency_norm).min(1.0);
            let agreement_share = agreeing as f64 / (n - 1) as f64;
            let confidence = (frequency + agreement_share) / 2.0;
            if confidence < self.config.min_confidence {
                continue;
            }

            let kind = if rising {
                PatternKind::RisingTrend
            } else {
                PatternKind::FallingTrend
            };
            let (first_at, first) = points[0];
            let (last_at, last) = points[n - 1];
            patterns.push(
                Pattern::new(kind, key, confidence)
                    .with_feature("slope", slope)
                    .with_feature("points", n as f64)
                    .with_feature("agreement", agreement_share)
                    .with_feature("first", first)
                    .with_feature("last", last)
                    .with_feature("span_seconds", (last_at - first_at).num_milliseconds() as f64 / 1000.0)
                    .with_source(format!("metric:{key}@{}", last_at.to_rfc3339())),
            );
        }
        patterns
    }
}

/// Slope of value against sample index.
#[allow(clippy::cast_precision_loss)]
fn least_squares_slope(points: &VecDeque<MetricPoint>) -> f64 {
    let n = points.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = points.iter().map(|(_, v)| v).sum::<f64>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, (_, y)) in points.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
