//! Tests for error types

use trueno_adapt::Error;

#[test]
fn test_configuration_error() {
    let error = Error::Configuration("allocations sum to 0.9".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("0.9"));
}

#[test]
fn test_not_found_error() {
    let error = Error::not_found("experiment", "exp-404");
    assert_eq!(format!("{error}"), "experiment not found: exp-404");
}

#[test]
fn test_conflict_error_names_both_variants() {
    let error = Error::Conflict {
        experiment_id: "exp-1".to_string(),
        subject_id: "user-7".to_string(),
        existing: "control".to_string(),
        attempted: "boost".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("user-7"));
    assert!(error_str.contains("already assigned 'control'"));
    assert!(error_str.contains("refusing to overwrite with 'boost'"));
}

#[test]
fn test_all_rules_failed_lists_rules() {
    let error = Error::AllRulesFailed {
        failed: vec!["a".to_string(), "b".to_string()],
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("All 2 evaluated rules failed"));
    assert!(error_str.contains("a, b"));
}

#[test]
fn test_rule_failed_error() {
    let error = Error::RuleFailed {
        rule: "boost-on-drop".to_string(),
        reason: "handler timed out".to_string(),
    };
    assert_eq!(format!("{error}"), "Rule 'boost-on-drop' failed: handler timed out");
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(matches!(error, Error::Json(_)));
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_error_debug_format() {
    let error = Error::Computation("zero trials".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Computation"));
}
