//! Rule engine and feature extraction tests.

mod common;

use riskgate_core::config::PipelineConfig;
use riskgate_core::error::RiskError;
use riskgate_core::features::{
    build_context, in_night_window, EvalContext, FeatureVector, HistoryStats, FEATURE_NAMES,
};
use riskgate_core::rules::RuleEngine;
use riskgate_core::store::RiskStore;

fn quiet_context() -> EvalContext {
    EvalContext {
        amount: 150.0,
        hour_of_day: 14,
        is_night: false,
        is_new_device: false,
        is_location_mismatch: false,
        recent_user_txns: 0,
        recent_device_txns: 0,
    }
}

/// No triggered rules → rule_score 0.0.
#[test]
fn quiet_transaction_scores_zero() {
    let engine = RuleEngine::from_config(&PipelineConfig::default_test().rules);
    let outcome = engine.evaluate(&quiet_context());
    assert_eq!(outcome.score, 0.0);
    assert!(outcome.triggered.is_empty(), "no rule should trigger");
}

/// Amount over the configured threshold contributes its weight.
#[test]
fn high_amount_triggers() {
    let config = PipelineConfig::default_test();
    let engine = RuleEngine::from_config(&config.rules);
    let mut ctx = quiet_context();
    ctx.amount = 75_000.0;
    let outcome = engine.evaluate(&ctx);
    assert_eq!(outcome.triggered, vec!["high_amount"]);
    assert!((outcome.score - config.rules.high_amount_weight).abs() < 1e-9);
}

/// Exactly the threshold does not trigger; the rule is strictly-over.
#[test]
fn amount_at_threshold_does_not_trigger() {
    let config = PipelineConfig::default_test();
    let engine = RuleEngine::from_config(&config.rules);
    let mut ctx = quiet_context();
    ctx.amount = config.rules.high_amount_threshold;
    assert!(engine.evaluate(&ctx).triggered.is_empty());
}

/// Velocity fires only above the configured transaction count.
#[test]
fn velocity_triggers_over_window_count() {
    let config = PipelineConfig::default_test();
    let engine = RuleEngine::from_config(&config.rules);
    let mut ctx = quiet_context();
    ctx.recent_user_txns = config.rules.velocity_max_txns;
    assert!(engine.evaluate(&ctx).triggered.is_empty());
    ctx.recent_user_txns = config.rules.velocity_max_txns + 1;
    assert_eq!(engine.evaluate(&ctx).triggered, vec!["velocity"]);
}

/// All rules together clamp to 1.0.
#[test]
fn rule_score_clamps_to_one() {
    let engine = RuleEngine::from_config(&PipelineConfig::default_test().rules);
    let ctx = EvalContext {
        amount: 200_000.0,
        hour_of_day: 23,
        is_night: true,
        is_new_device: true,
        is_location_mismatch: true,
        recent_user_txns: 50,
        recent_device_txns: 50,
    };
    let outcome = engine.evaluate(&ctx);
    assert_eq!(outcome.triggered.len(), 5, "all five rules should trigger");
    assert_eq!(outcome.score, 1.0);
}

/// The rule set is open: registering a new rule requires no change to
/// any other component.
#[test]
fn custom_rules_can_be_registered() {
    let mut engine = RuleEngine::empty();
    engine.register("round_amount", 0.5, |ctx| ctx.amount % 1000.0 == 0.0);
    assert_eq!(engine.rule_count(), 1);

    let mut ctx = quiet_context();
    ctx.amount = 9_000.0;
    let outcome = engine.evaluate(&ctx);
    assert_eq!(outcome.triggered, vec!["round_amount"]);
    assert_eq!(outcome.score, 0.5);
}

/// Rules are pure: evaluating the same context twice yields identical
/// outcomes.
#[test]
fn evaluation_is_deterministic() {
    let engine = RuleEngine::from_config(&PipelineConfig::default_test().rules);
    let mut ctx = quiet_context();
    ctx.amount = 60_000.0;
    ctx.is_new_device = true;
    let first = engine.evaluate(&ctx);
    let second = engine.evaluate(&ctx);
    assert_eq!(first.score, second.score);
    assert_eq!(first.triggered, second.triggered);
}

// ── Night window ───────────────────────────────────────────────

#[test]
fn night_window_wraps_midnight() {
    assert!(in_night_window(22, 22, 6));
    assert!(in_night_window(23, 22, 6));
    assert!(in_night_window(0, 22, 6));
    assert!(in_night_window(5, 22, 6));
    assert!(!in_night_window(6, 22, 6));
    assert!(!in_night_window(14, 22, 6));
    // Non-wrapping window.
    assert!(in_night_window(2, 1, 5));
    assert!(!in_night_window(5, 1, 5));
}

// ── Context building ───────────────────────────────────────────

/// Malformed amounts fail fast with a validation error.
#[test]
fn malformed_amount_is_a_validation_error() {
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let mut txn = store
        .insert_transaction(&common::plain_txn("user-v", 10.0))
        .unwrap();
    txn.amount = -5.0;

    let config = PipelineConfig::default_test();
    let err = build_context(&txn, &HistoryStats::default(), &config.rules).unwrap_err();
    assert!(
        matches!(err, RiskError::Validation(_)),
        "expected validation error, got {err:?}"
    );
    assert!(!err.is_retryable(), "validation errors must not be retried");
}

/// A device id the user has never been seen with counts as new; no
/// device id never does.
#[test]
fn new_device_requires_a_device_id() {
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let config = PipelineConfig::default_test();

    let no_device = store
        .insert_transaction(&common::plain_txn("user-d", 10.0))
        .unwrap();
    let ctx = build_context(&no_device, &HistoryStats::default(), &config.rules).unwrap();
    assert!(!ctx.is_new_device);

    let with_device = store
        .insert_transaction(&common::txn_with(
            "user-d",
            10.0,
            "dev-1",
            "New York, US",
            common::day_time(15, 0),
        ))
        .unwrap();
    let ctx = build_context(&with_device, &HistoryStats::default(), &config.rules).unwrap();
    assert!(ctx.is_new_device, "unseen device id must count as new");

    let seen = HistoryStats {
        device_seen_before: true,
        ..HistoryStats::default()
    };
    let ctx = build_context(&with_device, &seen, &config.rules).unwrap();
    assert!(!ctx.is_new_device);
}

/// Location mismatch requires both a current and a known prior location.
#[test]
fn location_mismatch_needs_history() {
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let config = PipelineConfig::default_test();
    let txn = store
        .insert_transaction(&common::txn_with(
            "user-l",
            10.0,
            "dev-1",
            "Lagos, NG",
            common::day_time(15, 0),
        ))
        .unwrap();

    let no_history = HistoryStats::default();
    assert!(!build_context(&txn, &no_history, &config.rules)
        .unwrap()
        .is_location_mismatch);

    let same = HistoryStats {
        last_location: Some("Lagos, NG".into()),
        ..HistoryStats::default()
    };
    assert!(!build_context(&txn, &same, &config.rules)
        .unwrap()
        .is_location_mismatch);

    let different = HistoryStats {
        last_location: Some("New York, US".into()),
        ..HistoryStats::default()
    };
    assert!(build_context(&txn, &different, &config.rules)
        .unwrap()
        .is_location_mismatch);
}

/// The feature vector keeps its fixed shape and order.
#[test]
fn feature_vector_shape_is_fixed() {
    let ctx = quiet_context();
    let features = FeatureVector::from_context(&ctx);
    assert_eq!(features.len(), FEATURE_NAMES.len());
    let values = features.values();
    assert_eq!(values[0], 150.0, "amount comes first");
    assert_eq!(values[1], 14.0, "hour_of_day second");
    assert_eq!(values[2], 0.0, "is_night flag");
    assert!((values[5] - (151.0f64).ln()).abs() < 1e-9, "amount_log");
}
