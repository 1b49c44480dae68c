//! Feature extraction — a fixed-shape vector derived from one
//! transaction plus short-term historical aggregates.
//!
//! The extractor builds a single shared `EvalContext`; the rule engine
//! evaluates its predicates over it, and the statistical scorer consumes
//! the numeric projection. This stage is where malformed input fails
//! fast with a validation error; the later stages assume a sane context.

use crate::config::RulesConfig;
use crate::error::{RiskError, RiskResult};
use crate::transaction::Transaction;
use chrono::Timelike;

/// Canonical feature order. The model artifact must list exactly these
/// names, in this order.
pub const FEATURE_NAMES: [&str; 8] = [
    "amount",
    "hour_of_day",
    "is_night",
    "is_new_device",
    "is_location_mismatch",
    "amount_log",
    "recent_user_txns",
    "recent_device_txns",
];

/// Short-term aggregates for the transaction's user and device,
/// computed by the store over the configured lookback window.
#[derive(Debug, Clone, Default)]
pub struct HistoryStats {
    /// Transactions by the same user inside the window, this one excluded.
    pub recent_user_txns: i64,
    /// Transactions by the same user on the same device inside the window.
    pub recent_device_txns: i64,
    /// Whether this user has ever transacted from this device before.
    pub device_seen_before: bool,
    /// Location of the user's most recent prior transaction, if any.
    pub last_location: Option<String>,
}

/// The shared evaluation context: everything the rule engine and the
/// feature vector need, derived once per job.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub amount: f64,
    pub hour_of_day: u32,
    pub is_night: bool,
    pub is_new_device: bool,
    pub is_location_mismatch: bool,
    pub recent_user_txns: i64,
    pub recent_device_txns: i64,
}

/// Build the shared context for one transaction.
///
/// A device counts as new when the transaction carries a device id the
/// user has never been seen with. A location mismatch requires a known
/// prior location that differs from the current one; users without
/// history never mismatch.
pub fn build_context(
    txn: &Transaction,
    history: &HistoryStats,
    rules: &RulesConfig,
) -> RiskResult<EvalContext> {
    if !txn.amount.is_finite() || txn.amount < 0.0 {
        return Err(RiskError::Validation(format!(
            "txn={} has malformed amount {}",
            txn.id, txn.amount
        )));
    }
    let hour_of_day = txn.transaction_time.hour();
    let is_new_device = txn.device_id.is_some() && !history.device_seen_before;
    let is_location_mismatch = match (&txn.location, &history.last_location) {
        (Some(current), Some(last)) => current != last,
        _ => false,
    };
    Ok(EvalContext {
        amount: txn.amount,
        hour_of_day,
        is_night: in_night_window(hour_of_day, rules.night_start_hour, rules.night_end_hour),
        is_new_device,
        is_location_mismatch,
        recent_user_txns: history.recent_user_txns,
        recent_device_txns: history.recent_device_txns,
    })
}

/// Whether `hour` falls inside the window, wrapping midnight when
/// start > end (22..6 means 22,23,0..5).
pub fn in_night_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Fixed-shape numeric input to the statistical scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn from_context(ctx: &EvalContext) -> Self {
        Self {
            values: vec![
                ctx.amount,
                ctx.hour_of_day as f64,
                ctx.is_night as u8 as f64,
                ctx.is_new_device as u8 as f64,
                ctx.is_location_mismatch as u8 as f64,
                (1.0 + ctx.amount).ln(),
                ctx.recent_user_txns as f64,
                ctx.recent_device_txns as f64,
            ],
        }
    }

    /// Test/bench constructor for raw vectors; production code always
    /// goes through `from_context`.
    pub fn from_raw(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
