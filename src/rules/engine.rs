//! Rule evaluation engine
//!
//! Owns the running state/metric maps and history buffers. Registry reads
//! go through a `std::sync::RwLock` (never held across an await); the
//! evaluation-and-merge unit is serialised by a `tokio::sync::Mutex` over
//! the engine state.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::action::{run_actions, Effects, MetricEffect};
use super::{ActionHandler, AdaptationRule, HandlerRegistry, RuleContext, RuleRegistry};
use crate::config::EngineConfig;
use crate::experiment::MetricEvent;
use crate::history::{ContextEvent, History, Signal};
use crate::patterns::{Pattern, PatternDetector};
use crate::{Error, Result};

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Rules whose condition was evaluated
    pub evaluated: usize,
    /// Names of rules that fired and completed their actions, in rule order
    pub triggered: Vec<String>,
    /// Rules whose condition or actions failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl EvaluationReport {
    /// Number of rules that fired.
    #[must_use]
    pub fn triggered_count(&self) -> usize {
        self.triggered.len()
    }
}

#[derive(Debug)]
struct EngineState {
    state: Map<String, Value>,
    metrics: BTreeMap<String, f64>,
    history: History,
}

struct Periodic {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

enum Pending {
    Immediate(String),
    Running(String, JoinHandle<(Effects, Option<Error>)>),
}

/// Prioritised rule evaluation over live metrics, state and history.
pub struct RuleEvaluationEngine {
    config: EngineConfig,
    detector: PatternDetector,
    rules: RwLock<RuleRegistry>,
    handlers: Arc<HandlerRegistry>,
    dispatch: Arc<Semaphore>,
    inner: Mutex<EngineState>,
    periodic: Mutex<Option<Periodic>>,
}

impl std::fmt::Debug for RuleEvaluationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEvaluationEngine")
            .field("config", &self.config)
            .field("rules", &self.read_rules().len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl RuleEvaluationEngine {
    /// Create an engine with a default pattern detector.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_detector(config, PatternDetector::default())
    }

    /// Create an engine with the given pattern detector.
    #[must_use]
    pub fn with_detector(config: EngineConfig, detector: PatternDetector) -> Self {
        let history = History::new(config.history_window);
        Self::with_history(config, detector, history)
    }

    /// Create an engine over pre-populated history buffers.
    #[must_use]
    pub fn with_history(config: EngineConfig, detector: PatternDetector, history: History) -> Self {
        let permits = config.max_concurrent_actions.max(1);
        Self {
            config,
            detector,
            rules: RwLock::new(RuleRegistry::new()),
            handlers: Arc::new(HandlerRegistry::new()),
            dispatch: Arc::new(Semaphore::new(permits)),
            inner: Mutex::new(EngineState {
                state: Map::new(),
                metrics: BTreeMap::new(),
                history,
            }),
            periodic: Mutex::new(None),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // A panicked writer cannot leave the registry half-updated (every
    // mutation is a single Vec operation), so poisoning is ignored.
    fn read_rules(&self) -> RwLockReadGuard<'_, RuleRegistry> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_rules(&self) -> RwLockWriteGuard<'_, RuleRegistry> {
        self.rules.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a rule (matched by name).
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an empty rule name.
    pub fn register(&self, rule: AdaptationRule) -> Result<Option<AdaptationRule>> {
        let name = rule.name.clone();
        let replaced = self.write_rules().register(rule)?;
        debug!(rule = %name, replaced = replaced.is_some(), "Registered rule");
        Ok(replaced)
    }

    /// Remove a rule by name. Absent names are a no-op.
    pub fn unregister(&self, name: &str) -> Option<AdaptationRule> {
        let removed = self.write_rules().unregister(name);
        if removed.is_some() {
            debug!(rule = %name, "Unregistered rule");
        }
        removed
    }

    /// Enable or disable a rule.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown names.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.write_rules().set_enabled(name, enabled)
    }

    /// Current definition of a rule.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<AdaptationRule> {
        self.read_rules().get(name).cloned()
    }

    /// All rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> Vec<AdaptationRule> {
        self.read_rules().iter().cloned().collect()
    }

    /// Register the handler behind `Invoke { handler: name, .. }` actions.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Shallow-merge metrics and append each value to its history series.
    pub async fn update_metrics<I>(&self, metrics: I)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        for (key, value) in metrics {
            inner.history.push_metric(&key, now, value);
            inner.metrics.insert(key, value);
        }
    }

    /// Shallow-merge state entries.
    pub async fn update_state<I>(&self, state: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut inner = self.inner.lock().await;
        inner.state.extend(state);
    }

    /// Append an event payload to the bounded event history.
    pub async fn observe_event(&self, payload: Value) {
        let event = ContextEvent {
            timestamp: Utc::now(),
            payload,
        };
        self.inner.lock().await.history.push_event(event);
    }

    /// Build a fresh snapshot of the engine's state and history.
    pub async fn context(&self, event: Option<Value>) -> RuleContext {
        let inner = self.inner.lock().await;
        RuleContext::from_parts(Utc::now(), event, &inner.state, &inner.metrics, &inner.history)
    }

    /// Record an event, then evaluate every enabled rule with it attached.
    ///
    /// # Errors
    /// Returns [`Error::AllRulesFailed`] if every evaluated rule failed.
    pub async fn process_event(&self, payload: Value) -> Result<EvaluationReport> {
        self.observe_event(payload.clone()).await;
        let context = self.context(Some(payload)).await;
        self.evaluate_triggered(&context).await
    }

    /// Evaluate all enabled rules against `context`.
    ///
    /// # Errors
    /// Returns [`Error::AllRulesFailed`] if at least one rule was evaluated
    /// and every one of them failed.
    pub async fn evaluate_triggered(&self, context: &RuleContext) -> Result<EvaluationReport> {
        let rules = self.read_rules().enabled();
        self.run_pass(rules, context).await
    }

    /// Evaluate only the rules with the given IDs. Disabled rules are skipped.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown rule ID (before anything
    /// runs) and [`Error::AllRulesFailed`] as for [`Self::evaluate_triggered`].
    pub async fn apply(&self, rule_ids: &[String], context: &RuleContext) -> Result<EvaluationReport> {
        let rules = {
            let registry = self.read_rules();
            Self::check_ids(&registry, rule_ids)?;
            registry
                .iter()
                .filter(|r| r.enabled && rule_ids.contains(&r.id))
                .cloned()
                .collect()
        };
        self.run_pass(rules, context).await
    }

    /// Check that every ID names a registered rule, enabled or not.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for the first unknown ID.
    pub fn require_rules(&self, rule_ids: &[String]) -> Result<()> {
        Self::check_ids(&self.read_rules(), rule_ids)
    }

    fn check_ids(registry: &RuleRegistry, rule_ids: &[String]) -> Result<()> {
        match rule_ids.iter().find(|id| registry.get_by_id(id).is_none()) {
            Some(id) => Err(Error::not_found("rule", id.as_str())),
            None => Ok(()),
        }
    }

    async fn run_pass(&self, rules: Vec<AdaptationRule>, context: &RuleContext) -> Result<EvaluationReport> {
        let mut inner = self.inner.lock().await;
        let timestamp = context.timestamp();
        let snapshot = Arc::new(context.clone());
        let mut report = EvaluationReport {
            evaluated: rules.len(),
            ..EvaluationReport::default()
        };

        // Conditions all see the same snapshot; action lists start as they match.
        let mut pending = Vec::new();
        for rule in rules {
            match rule.condition.evaluate(context) {
                Ok(false) => {}
                Ok(true) if rule.actions.is_empty() => pending.push(Pending::Immediate(rule.name)),
                Ok(true) => {
                    let permit = Arc::clone(&self.dispatch)
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::Other(format!("action dispatcher closed: {e}")))?;
                    let handlers = Arc::clone(&self.handlers);
                    let ctx = Arc::clone(&snapshot);
                    let name = rule.name.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = permit;
                        run_actions(&rule.name, &rule.actions, &ctx, &handlers, timestamp).await
                    });
                    pending.push(Pending::Running(name, handle));
                }
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "Rule condition failed");
                    report.failed.push((rule.name, e.to_string()));
                }
            }
        }

        // Merge in rule order so results do not depend on task scheduling
        for entry in pending {
            let (name, outcome) = match entry {
                Pending::Immediate(name) => (name, None),
                Pending::Running(name, handle) => match handle.await {
                    Ok((effects, error)) => {
                        inner.merge(effects, timestamp);
                        (name, error)
                    }
                    Err(e) => {
                        let error = Error::RuleFailed {
                            rule: name.clone(),
                            reason: format!("action task aborted: {e}"),
                        };
                        (name, Some(error))
                    }
                },
            };
            match outcome {
                None => {
                    debug!(rule = %name, "Rule triggered");
                    report.triggered.push(name);
                }
                Some(e) => {
                    warn!(rule = %name, error = %e, "Rule action failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        drop(inner);

        if !report.triggered.is_empty() {
            let mut registry = self.write_rules();
            for name in &report.triggered {
                registry.mark_triggered(name, timestamp);
            }
        }

        debug!(
            evaluated = report.evaluated,
            triggered = report.triggered.len(),
            failed = report.failed.len(),
            "Evaluation pass complete"
        );

        if report.evaluated > 0 && report.failed.len() == report.evaluated {
            return Err(Error::AllRulesFailed {
                failed: report.failed.into_iter().map(|(name, _)| name).collect(),
            });
        }
        Ok(report)
    }

    /// Detect patterns in a batch of events and in the metric history and
    /// record them in the pattern history. Re-detected patterns refresh the
    /// stored record (same ID, new confidence). Returns the stored patterns.
    pub async fn ingest(&self, events: &[MetricEvent]) -> Vec<Pattern> {
        let mut inner = self.inner.lock().await;
        let mut detected = self.detector.detect(events);
        detected.extend(self.detector.detect_trends(inner.history.metric_series()));
        let patterns: Vec<Pattern> = detected
            .into_iter()
            .map(|pattern| inner.history.upsert_pattern(pattern))
            .collect();
        debug!(events = events.len(), patterns = patterns.len(), "Ingested event batch");
        patterns
    }

    /// Current value of a metric.
    pub async fn metric(&self, key: &str) -> Option<f64> {
        self.inner.lock().await.metrics.get(key).copied()
    }

    /// Current value of a state entry.
    pub async fn state_value(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.state.get(key).cloned()
    }

    /// Signals in history, oldest first.
    pub async fn signals(&self) -> Vec<Signal> {
        self.inner.lock().await.history.signals().iter().cloned().collect()
    }

    /// Patterns in history, oldest first.
    pub async fn patterns(&self) -> Vec<Pattern> {
        self.inner.lock().await.history.patterns().iter().cloned().collect()
    }

    /// Start re-evaluating a synthetic context every `evaluation_interval`.
    ///
    /// Returns `false` if the loop is already running. The loop holds only a
    /// weak reference and exits on its own once the engine is dropped.
    pub async fn start_periodic(self: &Arc<Self>) -> bool {
        let mut periodic = self.periodic.lock().await;
        if periodic.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let period = self.config.evaluation_interval();
        let handle = tokio::spawn(run_periodic(Arc::downgrade(self), token.clone(), period));
        *periodic = Some(Periodic { token, handle });
        info!(interval_ms = self.config.evaluation_interval_ms, "Started periodic rule evaluation");
        true
    }

    /// Stop the periodic loop and wait for it to exit. Idempotent.
    ///
    /// An evaluation already in progress completes; none starts afterwards.
    pub async fn stop(&self) {
        let mut periodic = self.periodic.lock().await;
        if let Some(Periodic { token, handle }) = periodic.take() {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Periodic evaluation task ended abnormally");
            }
            info!("Stopped periodic rule evaluation");
        }
    }

    /// Check if the periodic loop is running.
    pub async fn is_running(&self) -> bool {
        self.periodic
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }
}

impl EngineState {
    fn merge(&mut self, effects: Effects, timestamp: chrono::DateTime<Utc>) {
        self.state.extend(effects.state);
        for effect in effects.metrics {
            let (key, value) = match effect {
                MetricEffect::Set(key, value) => (key, value),
                MetricEffect::Increment(key, by) => {
                    let value = self.metrics.get(&key).copied().unwrap_or(0.0) + by;
                    (key, value)
                }
            };
            self.history.push_metric(&key, timestamp, value);
            self.metrics.insert(key, value);
        }
        for signal in effects.signals {
            self.history.push_signal(signal);
        }
    }
}

async fn run_periodic(engine: Weak<RuleEvaluationEngine>, token: CancellationToken, period: std::time::Duration) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = tick.tick() => {
                let Some(engine) = engine.upgrade() else { break };
                let context = engine.context(None).await;
                match engine.evaluate_triggered(&context).await {
                    Ok(report) => debug!(triggered = report.triggered.len(), "Periodic evaluation"),
                    Err(e) => warn!(error = %e, "Periodic evaluation failed"),
                }
            }
        }
    }
    debug!("Periodic evaluation loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Action, CompareOp, Condition};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Failing;

    #[async_trait]
    impl ActionHandler for Failing {
        async fn handle(&self, _rule: &str, _params: &Value, _context: &RuleContext) -> anyhow::Result<()> {
            anyhow::bail!("handler unavailable")
        }
    }

    #[derive(Default)]
    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ActionHandler for Gauge {
        async fn handle(&self, _rule: &str, _params: &Value, _context: &RuleContext) -> anyhow::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn engine() -> RuleEvaluationEngine {
        RuleEvaluationEngine::new(EngineConfig::default())
    }

    fn rule(name: &str, condition: Condition) -> AdaptationRule {
        AdaptationRule::new(format!("id-{name}"), name, condition)
    }

    #[tokio::test]
    async fn test_false_condition_never_triggers() {
        let engine = engine();
        engine.register(rule("never", Condition::Never)).unwrap();

        for _ in 0..3 {
            let ctx = engine.context(None).await;
            let report = engine.evaluate_triggered(&ctx).await.unwrap();
            assert_eq!(report.evaluated, 1);
            assert!(report.triggered.is_empty());
        }
        assert!(engine.rule("never").unwrap().last_triggered.is_none());
    }

    #[tokio::test]
    async fn test_true_condition_triggers_every_call() {
        let engine = engine();
        engine
            .register(rule("count", Condition::Always).with_action(Action::IncrementMetric {
                key: "hits".into(),
                by: 1.0,
            }))
            .unwrap();

        let mut last = None;
        for _ in 0..3 {
            let ctx = engine.context(None).await;
            engine.evaluate_triggered(&ctx).await.unwrap();
            last = Some(ctx.timestamp());
        }
        assert_eq!(engine.metric("hits").await, Some(3.0));
        assert_eq!(engine.rule("count").unwrap().last_triggered, last);
    }

    #[tokio::test]
    async fn test_failing_rule_does_not_block_others() {
        let engine = engine();
        engine.register_handler("fail", Arc::new(Failing));
        engine
            .register(rule("broken", Condition::Always).with_priority(0).with_action(Action::Invoke {
                handler: "fail".into(),
                params: Value::Null,
            }))
            .unwrap();
        engine
            .register(rule("healthy", Condition::Always).with_priority(1).with_action(Action::SetState {
                key: "mode".into(),
                value: json!("adapted"),
            }))
            .unwrap();

        let ctx = engine.context(None).await;
        let report = engine.evaluate_triggered(&ctx).await.unwrap();

        assert_eq!(report.triggered, vec!["healthy".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(engine.state_value("mode").await, Some(json!("adapted")));
        assert!(engine.rule("broken").unwrap().last_triggered.is_none());
    }

    #[tokio::test]
    async fn test_condition_error_isolated() {
        let engine = engine();
        engine.update_state([("mode".to_string(), json!("normal"))]).await;
        engine
            .register(rule("bad", Condition::compare("state.mode", CompareOp::Gt, 1)))
            .unwrap();
        engine.register(rule("good", Condition::Always)).unwrap();

        let ctx = engine.context(None).await;
        let report = engine.evaluate_triggered(&ctx).await.unwrap();
        assert_eq!(report.triggered, vec!["good".to_string()]);
        assert_eq!(report.failed[0].0, "bad");
    }

    #[tokio::test]
    async fn test_all_rules_failing_is_error() {
        let engine = engine();
        engine.register_handler("fail", Arc::new(Failing));
        for name in ["a", "b"] {
            engine
                .register(rule(name, Condition::Always).with_action(Action::Invoke {
                    handler: "fail".into(),
                    params: Value::Null,
                }))
                .unwrap();
        }

        let ctx = engine.context(None).await;
        let err = engine.evaluate_triggered(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::AllRulesFailed { ref failed } if failed.len() == 2));
    }

    #[tokio::test]
    async fn test_no_rules_is_ok() {
        let engine = engine();
        let ctx = engine.context(None).await;
        let report = engine.evaluate_triggered(&ctx).await.unwrap();
        assert_eq!(report, EvaluationReport::default());
    }

    #[tokio::test]
    async fn test_conditions_share_one_snapshot() {
        let engine = engine();
        engine
            .register(rule("first", Condition::Always).with_priority(0).with_action(Action::SetMetric {
                key: "load".into(),
                value: 10.0,
            }))
            .unwrap();
        engine
            .register(
                rule("second", Condition::compare("metrics.load", CompareOp::Gt, 5.0)).with_priority(1),
            )
            .unwrap();

        let ctx = engine.context(None).await;
        let report = engine.evaluate_triggered(&ctx).await.unwrap();
        assert_eq!(report.triggered, vec!["first".to_string()]);

        let ctx = engine.context(None).await;
        let report = engine.evaluate_triggered(&ctx).await.unwrap();
        assert_eq!(report.triggered.len(), 2);
    }

    #[tokio::test]
    async fn test_effects_merge_in_rule_order() {
        let engine = engine();
        for (name, priority, value) in [("low", 2, "late"), ("high", 1, "early")] {
            engine
                .register(rule(name, Condition::Always).with_priority(priority).with_action(Action::SetState {
                    key: "winner".into(),
                    value: json!(value),
                }))
                .unwrap();
        }

        let ctx = engine.context(None).await;
        engine.evaluate_triggered(&ctx).await.unwrap();
        assert_eq!(engine.state_value("winner").await, Some(json!("late")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_action_concurrency_bounded() {
        let engine = RuleEvaluationEngine::new(EngineConfig {
            max_concurrent_actions: 2,
            ..EngineConfig::default()
        });
        let gauge = Arc::new(Gauge::default());
        engine.register_handler("gauge", gauge.clone());
        for i in 0..6 {
            engine
                .register(rule(&format!("r{i}"), Condition::Always).with_action(Action::Invoke {
                    handler: "gauge".into(),
                    params: Value::Null,
                }))
                .unwrap();
        }

        let ctx = engine.context(None).await;
        let report = engine.evaluate_triggered(&ctx).await.unwrap();
        assert_eq!(report.triggered.len(), 6);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_apply_selected_rules() {
        let engine = engine();
        engine.register(rule("a", Condition::Always)).unwrap();
        engine.register(rule("b", Condition::Always)).unwrap();

        let ctx = engine.context(None).await;
        let report = engine.apply(&["id-b".to_string()], &ctx).await.unwrap();
        assert_eq!(report.triggered, vec!["b".to_string()]);

        let err = engine.apply(&["id-zzz".to_string()], &ctx).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_history_window_bounds_series() {
        let engine = RuleEvaluationEngine::new(EngineConfig {
            history_window: 3,
            ..EngineConfig::default()
        });
        for i in 0..10 {
            engine.update_metrics([("ctr".to_string(), f64::from(i))]).await;
        }
        let ctx = engine.context(None).await;
        let values: Vec<f64> = ctx.metric_history("ctr").iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
        assert_eq!(ctx.metric("ctr"), Some(9.0));
    }

    #[tokio::test]
    async fn test_process_event_attaches_payload() {
        let engine = engine();
        engine
            .register(rule("zero-results", Condition::compare("event.results", CompareOp::Eq, 0)).with_action(
                Action::Signal {
                    name: "empty_search".into(),
                    payload: Value::Null,
                },
            ))
            .unwrap();

        let report = engine.process_event(json!({ "results": 0 })).await.unwrap();
        assert_eq!(report.triggered.len(), 1);
        assert_eq!(engine.signals().await[0].name, "empty_search");
        assert_eq!(engine.context(None).await.event_history().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_records_patterns() {
        let engine = engine();
        for i in 0..5 {
            engine.update_metrics([("latency".to_string(), f64::from(i) * 10.0)]).await;
        }
        let events: Vec<MetricEvent> = (0..4)
            .map(|i| MetricEvent::new("exp", "A", format!("s{i}"), "click", 1.0))
            .collect();

        let patterns = engine.ingest(&events).await;
        assert!(patterns.iter().any(|p| p.key() == "exp/click"));
        assert!(patterns.iter().any(|p| p.key() == "latency"));
        assert_eq!(engine.patterns().await.len(), patterns.len());
    }

    #[tokio::test]
    async fn test_periodic_start_stop() {
        let engine = Arc::new(RuleEvaluationEngine::new(EngineConfig {
            evaluation_interval_ms: 10,
            ..EngineConfig::default()
        }));
        engine
            .register(rule("tick", Condition::Always).with_action(Action::IncrementMetric {
                key: "ticks".into(),
                by: 1.0,
            }))
            .unwrap();

        assert!(engine.start_periodic().await);
        assert!(!engine.start_periodic().await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.stop().await;
        assert!(!engine.is_running().await);

        let ticks = engine.metric("ticks").await.unwrap_or(0.0);
        assert!(ticks >= 1.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.metric("ticks").await.unwrap_or(0.0), ticks);

        engine.stop().await;
    }
}
