#![allow(dead_code)]
//! Shared helpers for the integration tests: deterministic scorers and
//! transaction builders.

use chrono::{DateTime, TimeZone, Utc};
use riskgate_core::error::{RiskError, RiskResult};
use riskgate_core::features::FeatureVector;
use riskgate_core::scorer::FraudScorer;
use riskgate_core::transaction::NewTransaction;
use std::sync::atomic::{AtomicU32, Ordering};

/// Scorer returning one fixed probability for every input.
pub struct FixedScorer(pub f64);

impl FraudScorer for FixedScorer {
    fn version(&self) -> &str {
        "fixed-test"
    }

    fn score(&self, _features: &FeatureVector) -> RiskResult<f64> {
        Ok(self.0)
    }
}

/// Scorer failing every call with a retryable scoring error, counting
/// the inference attempts it sees.
pub struct FailingScorer {
    pub calls: AtomicU32,
}

impl FailingScorer {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

impl FraudScorer for FailingScorer {
    fn version(&self) -> &str {
        "failing-test"
    }

    fn score(&self, _features: &FeatureVector) -> RiskResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RiskError::Scoring("simulated inference failure".into()))
    }
}

/// A daytime transaction with no device, location or velocity signals.
pub fn plain_txn(user: &str, amount: f64) -> NewTransaction {
    NewTransaction {
        user_id: user.to_string(),
        amount,
        currency: "USD".into(),
        location: None,
        device_id: None,
        ip_address: None,
        transaction_time: day_time(14, 30),
    }
}

/// A fully populated transaction for history-sensitive tests.
pub fn txn_with(
    user: &str,
    amount: f64,
    device: &str,
    location: &str,
    time: DateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        user_id: user.to_string(),
        amount,
        currency: "USD".into(),
        location: Some(location.to_string()),
        device_id: Some(device.to_string()),
        ip_address: Some("203.0.113.7".into()),
        transaction_time: time,
    }
}

/// A fixed daytime instant; tests stay deterministic regardless of when
/// they run.
pub fn day_time(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}
