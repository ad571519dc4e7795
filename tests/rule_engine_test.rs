//! Rule engine tests
//!
//! Rules are loaded from JSON descriptors the way the persistence layer
//! stores them, then driven through metrics, events, patterns and signals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use trueno_adapt::config::EngineConfig;
use trueno_adapt::experiment::MetricEvent;
use trueno_adapt::rules::{ActionHandler, AdaptationRule, RuleContext, RuleEvaluationEngine};
use trueno_adapt::Error;

fn rule(descriptor: Value) -> AdaptationRule {
    serde_json::from_value(descriptor).expect("valid rule descriptor")
}

struct Recorder(AtomicUsize);

#[async_trait]
impl ActionHandler for Recorder {
    async fn handle(&self, _rule: &str, params: &Value, context: &RuleContext) -> anyhow::Result<()> {
        anyhow::ensure!(params["expect_event"] == false || context.event().is_some(), "missing event");
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_history_condition_over_metric_series() {
    let engine = RuleEvaluationEngine::new(EngineConfig::default());
    engine
        .register(rule(json!({
            "id": "r-latency",
            "name": "latency-climbing",
            "condition": {
                "type": "history", "metric": "latency_p95", "window": 3,
                "aggregate": "avg", "op": "gt", "value": 250.0
            },
            "actions": [{ "type": "set_state", "key": "cache_mode", "value": "aggressive" }]
        })))
        .unwrap();

    for value in [100.0, 120.0, 110.0] {
        engine.update_metrics([("latency_p95".to_string(), value)]).await;
    }
    let report = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert!(report.triggered.is_empty());

    for value in [280.0, 300.0, 320.0] {
        engine.update_metrics([("latency_p95".to_string(), value)]).await;
    }
    let report = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert_eq!(report.triggered, vec!["latency-climbing".to_string()]);
    assert_eq!(engine.state_value("cache_mode").await, Some(json!("aggressive")));
}

#[tokio::test]
async fn test_missing_metric_never_triggers() {
    let engine = RuleEvaluationEngine::new(EngineConfig::default());
    engine
        .register(rule(json!({
            "id": "r-1", "name": "ctr-low",
            "condition": { "type": "compare", "path": "metrics.ctr", "op": "lt", "value": 0.1 }
        })))
        .unwrap();

    let report = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert_eq!(report.evaluated, 1);
    assert!(report.triggered.is_empty());
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_patterns_feed_back_into_rules() {
    let engine = RuleEvaluationEngine::new(EngineConfig::default());
    engine
        .register(rule(json!({
            "id": "r-zero",
            "name": "zero-results-surge",
            "condition": {
                "type": "pattern", "kind": "frequency", "key": "search/zero_results",
                "min_confidence": 0.5
            },
            "actions": [{ "type": "signal", "name": "expand_synonyms" }]
        })))
        .unwrap();

    let before = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert!(before.triggered.is_empty());

    let events: Vec<MetricEvent> = (0..12)
        .map(|i| MetricEvent::new("search", "A", format!("user-{}", i % 6), "zero_results", 1.0))
        .collect();
    let patterns = engine.ingest(&events).await;
    assert_eq!(patterns.len(), 1);
    assert!(patterns[0].confidence() >= 0.5);

    let after = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert_eq!(after.triggered, vec!["zero-results-surge".to_string()]);
    assert_eq!(engine.signals().await[0].name, "expand_synonyms");
}

#[tokio::test]
async fn test_signals_visible_to_next_pass() {
    let engine = RuleEvaluationEngine::new(EngineConfig::default());
    engine
        .register(rule(json!({
            "id": "r-1", "name": "emit", "priority": 0,
            "condition": { "type": "always" },
            "actions": [{ "type": "signal", "name": "degraded" }]
        })))
        .unwrap();
    engine
        .register(rule(json!({
            "id": "r-2", "name": "react", "priority": 1,
            "condition": { "type": "signaled", "name": "degraded" },
            "actions": [{ "type": "increment_metric", "key": "reactions", "by": 1 }]
        })))
        .unwrap();

    let first = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert_eq!(first.triggered, vec!["emit".to_string()]);

    let second = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert_eq!(second.triggered.len(), 2);
    assert_eq!(engine.metric("reactions").await, Some(1.0));
}

#[tokio::test]
async fn test_disabled_and_unregistered_rules_skipped() {
    let engine = RuleEvaluationEngine::new(EngineConfig::default());
    engine
        .register(rule(json!({
            "id": "r-1", "name": "off", "enabled": false,
            "condition": { "type": "always" }
        })))
        .unwrap();
    engine
        .register(rule(json!({ "id": "r-2", "name": "gone", "condition": { "type": "always" } })))
        .unwrap();
    assert!(engine.unregister("gone").is_some());
    assert!(engine.unregister("gone").is_none());

    let report = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert_eq!(report.evaluated, 0);

    engine.set_enabled("off", true).unwrap();
    let report = engine.evaluate_triggered(&engine.context(None).await).await.unwrap();
    assert_eq!(report.triggered, vec!["off".to_string()]);
}

#[tokio::test]
async fn test_handlers_receive_event_context() {
    let engine = RuleEvaluationEngine::new(EngineConfig::default());
    let recorder = Arc::new(Recorder(AtomicUsize::new(0)));
    engine.register_handler("recorder", recorder.clone());
    engine
        .register(rule(json!({
            "id": "r-1", "name": "on-query",
            "condition": { "type": "exists", "path": "event.query" },
            "actions": [{ "type": "invoke", "handler": "recorder", "params": { "expect_event": true } }]
        })))
        .unwrap();

    engine.process_event(json!({ "query": "rust async" })).await.unwrap();
    engine.process_event(json!({ "page": 2 })).await.unwrap();
    assert_eq!(recorder.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_single_failing_rule_is_reported_as_error() {
    let engine = RuleEvaluationEngine::new(EngineConfig::default());
    engine
        .register(rule(json!({
            "id": "r-1", "name": "orphan",
            "condition": { "type": "always" },
            "actions": [{ "type": "invoke", "handler": "missing" }]
        })))
        .unwrap();

    let err = engine.evaluate_triggered(&engine.context(None).await).await.unwrap_err();
    assert!(matches!(err, Error::AllRulesFailed { .. }));
    assert!(engine.rule("orphan").unwrap().last_triggered.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_passes_merge_serially() {
    let engine = Arc::new(RuleEvaluationEngine::new(EngineConfig::default()));
    engine
        .register(rule(json!({
            "id": "r-1", "name": "count",
            "condition": { "type": "always" },
            "actions": [{ "type": "increment_metric", "key": "passes", "by": 1 }]
        })))
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let context = engine.context(None).await;
                engine.evaluate_triggered(&context).await.unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(engine.metric("passes").await, Some(10.0));
}

#[tokio::test]
async fn test_no_action_after_stop() {
    let engine = Arc::new(RuleEvaluationEngine::new(EngineConfig {
        evaluation_interval_ms: 5,
        ..EngineConfig::default()
    }));
    engine
        .register(rule(json!({
            "id": "r-1", "name": "tick",
            "condition": { "type": "always" },
            "actions": [{ "type": "increment_metric", "key": "ticks", "by": 1 }]
        })))
        .unwrap();

    assert!(engine.start_periodic().await);
    assert!(engine.is_running().await);
    tokio::time::sleep(Duration::from_millis(40)).await;
    engine.stop().await;
    engine.stop().await;

    let settled = engine.metric("ticks").await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(engine.metric("ticks").await, settled);

    assert!(engine.start_periodic().await);
    engine.stop().await;
    assert!(!engine.is_running().await);
}
