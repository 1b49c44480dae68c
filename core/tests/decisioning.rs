//! Combiner and decision-mapping tests: score blending, threshold
//! boundaries, and the risk-level → status mapping.

use riskgate_core::combiner::{combine, hybrid_score, risk_level_for, status_for};
use riskgate_core::config::{CombinerWeights, RiskThresholds};
use riskgate_core::transaction::{RiskLevel, TransactionStatus};

fn default_weights() -> CombinerWeights {
    CombinerWeights {
        ml_weight: 0.7,
        rule_weight: 0.3,
    }
}

fn default_thresholds() -> RiskThresholds {
    RiskThresholds {
        t_low: 0.3,
        t_high: 0.7,
    }
}

/// final_score = 0.7 * ml + 0.3 * rule, within float tolerance.
#[test]
fn hybrid_score_matches_weighted_formula() {
    let weights = default_weights();
    let cases = [
        (0.05, 0.0, 0.035),
        (0.9, 0.6, 0.81),
        (0.0, 0.0, 0.0),
        (1.0, 1.0, 1.0),
        (0.5, 0.5, 0.5),
    ];
    for (ml, rule, expected) in cases {
        let got = hybrid_score(&weights, ml, rule);
        assert!(
            (got - expected).abs() < 1e-9,
            "hybrid({ml}, {rule}) = {got}, expected {expected}"
        );
    }
}

/// Final scores never leave [0, 1] even for out-of-range weights.
#[test]
fn hybrid_score_is_clamped() {
    let heavy = CombinerWeights {
        ml_weight: 2.0,
        rule_weight: 1.0,
    };
    assert_eq!(hybrid_score(&heavy, 1.0, 1.0), 1.0);
    assert_eq!(hybrid_score(&heavy, 0.0, 0.0), 0.0);
}

/// Exactly t_low resolves to suspicious and exactly t_high to
/// fraudulent (closed lower bounds).
#[test]
fn threshold_boundaries_are_closed_below() {
    let thresholds = default_thresholds();
    assert_eq!(risk_level_for(&thresholds, 0.3), RiskLevel::Suspicious);
    assert_eq!(risk_level_for(&thresholds, 0.7), RiskLevel::Fraudulent);
    assert_eq!(
        risk_level_for(&thresholds, 0.3 - 1e-12),
        RiskLevel::Safe,
        "just under t_low must stay safe"
    );
    assert_eq!(
        risk_level_for(&thresholds, 0.7 - 1e-12),
        RiskLevel::Suspicious,
        "just under t_high must stay suspicious"
    );
}

/// Risk level is a monotonic function of the final score.
#[test]
fn risk_level_is_monotonic_in_score() {
    let thresholds = default_thresholds();
    let rank = |level: RiskLevel| match level {
        RiskLevel::Safe => 0,
        RiskLevel::Suspicious => 1,
        RiskLevel::Fraudulent => 2,
    };
    let mut last = 0;
    for step in 0..=100 {
        let score = step as f64 / 100.0;
        let current = rank(risk_level_for(&thresholds, score));
        assert!(
            current >= last,
            "risk level regressed at score {score}: {current} < {last}"
        );
        last = current;
    }
}

/// safe → approved, suspicious → flagged, fraudulent → rejected.
#[test]
fn risk_level_maps_to_decision() {
    assert_eq!(status_for(RiskLevel::Safe), TransactionStatus::Approved);
    assert_eq!(status_for(RiskLevel::Suspicious), TransactionStatus::Flagged);
    assert_eq!(status_for(RiskLevel::Fraudulent), TransactionStatus::Rejected);
}

/// Thresholds are configuration: tighter values change the decision for
/// the same score.
#[test]
fn thresholds_are_configurable() {
    let strict = RiskThresholds {
        t_low: 0.1,
        t_high: 0.4,
    };
    assert_eq!(risk_level_for(&strict, 0.35), RiskLevel::Suspicious);
    assert_eq!(risk_level_for(&strict, 0.45), RiskLevel::Fraudulent);
    assert_eq!(
        risk_level_for(&default_thresholds(), 0.35),
        RiskLevel::Suspicious
    );
    assert_eq!(
        risk_level_for(&default_thresholds(), 0.45),
        RiskLevel::Suspicious
    );
}

/// combine() carries scores, level, status, and the model version.
#[test]
fn combine_builds_full_outcome() {
    let outcome = combine(
        &default_weights(),
        &default_thresholds(),
        0.9,
        0.6,
        "model-1.2.3",
    );
    assert!((outcome.final_score - 0.81).abs() < 1e-9);
    assert_eq!(outcome.risk_level, RiskLevel::Fraudulent);
    assert_eq!(outcome.status, TransactionStatus::Rejected);
    assert_eq!(outcome.model_version, "model-1.2.3");
    assert_eq!(outcome.ml_score, 0.9);
    assert_eq!(outcome.rule_score, 0.6);
}

/// Threshold validation rejects inverted or out-of-range pairs.
#[test]
fn threshold_validation() {
    assert!(default_thresholds().validate().is_ok());
    assert!(RiskThresholds {
        t_low: 0.7,
        t_high: 0.3
    }
    .validate()
    .is_err());
    assert!(RiskThresholds {
        t_low: -0.1,
        t_high: 0.5
    }
    .validate()
    .is_err());
    assert!(RiskThresholds {
        t_low: 0.5,
        t_high: 1.5
    }
    .validate()
    .is_err());
}
