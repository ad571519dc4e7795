//! Service facade
//!
//! Wires the experiment store, assignment service, aggregator, significance
//! calculator and rule engine together behind the operations the transport
//! layer calls. Inputs are assumed to be parsed and authenticated already.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assignment::VariantAssignmentService;
use crate::config::AdaptConfig;
use crate::experiment::{AssignmentSource, Experiment, ExperimentStatus, ExperimentStore, MetricEvent};
use crate::kv::{KvStore, MemoryKvStore};
use crate::metrics::{MetricsAggregator, SignificanceCalculator, SignificanceResult};
use crate::patterns::{Pattern, PatternDetector};
use crate::rules::{RuleContext, RuleEvaluationEngine};
use crate::{Error, Result};

/// Result of `assign_variant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAssignment {
    /// Assigned variant
    pub variant_id: String,
    /// The variant's named weights
    pub weights: BTreeMap<String, f64>,
    /// How the assignment was first decided
    pub source: AssignmentSource,
}

/// Conversion metrics of one variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantMetrics {
    /// Distinct subjects with any event
    pub sample_size: u64,
    /// Distinct subjects with a conversion event
    pub conversions: u64,
    /// `conversions / sample_size`, 0 for an empty variant
    pub conversion_rate: f64,
}

/// Control-vs-treatment significance for one variant pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantComparison {
    /// Control variant (the experiment's first)
    pub control: String,
    /// Treatment variant
    pub treatment: String,
    /// Test outcome
    pub result: SignificanceResult,
}

/// Result of `apply_rules`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesApplied {
    /// Rules that fired and completed
    pub applied_rule_count: usize,
}

/// Experimentation and adaptation facade.
pub struct AdaptService<S: KvStore = MemoryKvStore> {
    config: AdaptConfig,
    experiments: Arc<ExperimentStore>,
    assignments: VariantAssignmentService<S>,
    aggregator: MetricsAggregator,
    calculator: SignificanceCalculator,
    engine: Arc<RuleEvaluationEngine>,
}

impl AdaptService<MemoryKvStore> {
    /// Create a service backed by an in-memory assignment store.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn new(config: AdaptConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryKvStore::new()))
    }
}

impl<S: KvStore> AdaptService<S> {
    /// Create a service persisting assignments through `store`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn with_store(config: AdaptConfig, store: Arc<S>) -> Result<Self> {
        config.validate()?;
        let experiments = Arc::new(ExperimentStore::with_tolerance(config.assignment.allocation_tolerance));
        let engine = RuleEvaluationEngine::with_detector(
            config.engine.clone(),
            PatternDetector::new(config.patterns.clone()),
        );
        Ok(Self {
            assignments: VariantAssignmentService::new(store, config.assignment.strategy),
            aggregator: MetricsAggregator::new(Arc::clone(&experiments)),
            calculator: SignificanceCalculator::from_config(&config.significance),
            engine: Arc::new(engine),
            experiments,
            config,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AdaptConfig {
        &self.config
    }

    /// Experiment registry.
    #[must_use]
    pub const fn experiments(&self) -> &Arc<ExperimentStore> {
        &self.experiments
    }

    /// Assignment service.
    #[must_use]
    pub const fn assignments(&self) -> &VariantAssignmentService<S> {
        &self.assignments
    }

    /// Metrics aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    /// Rule engine (shared so the periodic loop can be started on it).
    #[must_use]
    pub const fn engine(&self) -> &Arc<RuleEvaluationEngine> {
        &self.engine
    }

    /// Register a validated experiment.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for invalid allocations or a duplicate ID.
    pub fn create_experiment(&self, experiment: Experiment) -> Result<()> {
        self.experiments.create(experiment)
    }

    /// Move an experiment to a new lifecycle status.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown experiments, [`Error::Configuration`]
    /// for illegal transitions.
    pub fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<()> {
        self.experiments.set_status(experiment_id, status)
    }

    /// Return the subject's variant, assigning one on first exposure.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the experiment is unknown or not active.
    pub async fn assign_variant(&self, subject_id: &str, experiment_id: &str) -> Result<VariantAssignment> {
        let experiment = self.experiments.require(experiment_id)?;
        let assignment = self.assignments.assign(subject_id, &experiment).await?;
        let weights = experiment
            .variant(assignment.variant_id())
            .map(|v| v.weights().clone())
            .unwrap_or_default();
        Ok(VariantAssignment {
            variant_id: assignment.variant_id().to_string(),
            weights,
            source: assignment.source(),
        })
    }

    /// Record an outcome event.
    ///
    /// # Errors
    /// Returns [`Error::InvalidReference`] for an unknown experiment or variant.
    pub fn track_event(
        &self,
        experiment_id: &str,
        variant_id: &str,
        subject_id: &str,
        event_type: &str,
        value: f64,
    ) -> Result<()> {
        self.aggregator
            .record(MetricEvent::new(experiment_id, variant_id, subject_id, event_type, value))
    }

    /// Per-variant conversion metrics, in variant ID order.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown experiment.
    pub fn compute_metrics(&self, experiment_id: &str) -> Result<BTreeMap<String, VariantMetrics>> {
        self.experiments.require(experiment_id)?;
        let proportions = self
            .aggregator
            .proportions(experiment_id, &self.config.metrics.conversion_event)?;
        Ok(proportions
            .into_iter()
            .map(|(variant_id, p)| {
                let metrics = VariantMetrics {
                    sample_size: p.trials,
                    conversions: p.successes,
                    conversion_rate: p.rate(),
                };
                (variant_id, metrics)
            })
            .collect())
    }

    /// Significance of the first treatment against the control.
    ///
    /// # Errors
    /// - [`Error::NotFound`] for an unknown experiment
    /// - [`Error::Computation`] for fewer than two variants or an empty variant
    pub fn compute_significance(&self, experiment_id: &str) -> Result<SignificanceResult> {
        let experiment = self.experiments.require(experiment_id)?;
        let [control, treatment, ..] = experiment.variants() else {
            return Err(Error::Computation(format!(
                "experiment '{experiment_id}' needs at least two variants to compare"
            )));
        };
        self.compare(experiment_id, control.id(), treatment.id())
            .map(|c| c.result)
    }

    /// Significance of every treatment against the control, in variant order.
    ///
    /// # Errors
    /// As for [`Self::compute_significance`].
    pub fn compare_all(&self, experiment_id: &str) -> Result<Vec<VariantComparison>> {
        let experiment = self.experiments.require(experiment_id)?;
        let Some((control, treatments)) = experiment.variants().split_first() else {
            return Err(Error::Computation(format!("experiment '{experiment_id}' has no variants")));
        };
        if treatments.is_empty() {
            return Err(Error::Computation(format!(
                "experiment '{experiment_id}' needs at least two variants to compare"
            )));
        }
        treatments
            .iter()
            .map(|t| self.compare(experiment_id, control.id(), t.id()))
            .collect()
    }

    fn compare(&self, experiment_id: &str, control: &str, treatment: &str) -> Result<VariantComparison> {
        let proportions = self
            .aggregator
            .proportions(experiment_id, &self.config.metrics.conversion_event)?;
        let side = |id: &str| {
            proportions
                .get(id)
                .copied()
                .ok_or_else(|| Error::not_found("variant", id))
        };
        let result = self.calculator.compute(side(control)?, side(treatment)?)?;
        debug!(
            experiment_id,
            control,
            treatment,
            p_value = result.p_value,
            significant = result.significant,
            "Computed significance"
        );
        Ok(VariantComparison {
            control: control.to_string(),
            treatment: treatment.to_string(),
            result,
        })
    }

    /// Evaluate the named rules against `context`.
    ///
    /// `metrics`, when given, are merged into the engine and overlaid on the
    /// context before evaluation. Rule IDs are checked first, so an unknown
    /// ID leaves the engine untouched.
    ///
    /// # Errors
    /// - [`Error::NotFound`] for an unknown rule ID
    /// - [`Error::AllRulesFailed`] if every evaluated rule failed
    pub async fn apply_rules(
        &self,
        rule_ids: &[String],
        context: RuleContext,
        metrics: Option<BTreeMap<String, f64>>,
    ) -> Result<RulesApplied> {
        self.engine.require_rules(rule_ids)?;
        let mut context = context;
        if let Some(metrics) = metrics {
            for (key, value) in &metrics {
                context = context.with_metric(key.clone(), *value);
            }
            self.engine.update_metrics(metrics).await;
        }
        let report = self.engine.apply(rule_ids, &context).await?;
        Ok(RulesApplied {
            applied_rule_count: report.triggered_count(),
        })
    }

    /// Publish an experiment's conversion rates to the engine and feed its
    /// raw events to pattern detection. Returns the detected patterns.
    ///
    /// Metric keys are `"<experiment>.<variant>.conversion_rate"` and
    /// `"<experiment>.<variant>.sample_size"`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown experiment.
    #[allow(clippy::cast_precision_loss)]
    pub async fn refresh_engine(&self, experiment_id: &str) -> Result<Vec<Pattern>> {
        let metrics = self.compute_metrics(experiment_id)?;
        let updates: Vec<(String, f64)> = metrics
            .iter()
            .flat_map(|(variant_id, m)| {
                [
                    (format!("{experiment_id}.{variant_id}.conversion_rate"), m.conversion_rate),
                    (format!("{experiment_id}.{variant_id}.sample_size"), m.sample_size as f64),
                ]
            })
            .collect();
        self.engine.update_metrics(updates).await;
        Ok(self.engine.ingest(&self.aggregator.events(experiment_id)).await)
    }
}
