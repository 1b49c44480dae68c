//! Transaction and alert domain records.
//!
//! RULE: `status` and the score fields move together. Scores are only
//! set once a transaction reaches `approved`, `flagged` or `rejected`;
//! an `evaluation_failed` transaction keeps them unset. Once a
//! transaction leaves `pending` it never returns there.

use crate::error::{RiskError, RiskResult};
use crate::types::{AlertId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Approved,
    Flagged,
    Rejected,
    EvaluationFailed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Flagged => "flagged",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::EvaluationFailed => "evaluation_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "processing" => Some(TransactionStatus::Processing),
            "approved" => Some(TransactionStatus::Approved),
            "flagged" => Some(TransactionStatus::Flagged),
            "rejected" => Some(TransactionStatus::Rejected),
            "evaluation_failed" => Some(TransactionStatus::EvaluationFailed),
            _ => None,
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Approved
                | TransactionStatus::Flagged
                | TransactionStatus::Rejected
                | TransactionStatus::EvaluationFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Suspicious,
    Fraudulent,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Suspicious => "suspicious",
            RiskLevel::Fraudulent => "fraudulent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(RiskLevel::Safe),
            "suspicious" => Some(RiskLevel::Suspicious),
            "fraudulent" => Some(RiskLevel::Fraudulent),
            _ => None,
        }
    }

    /// Suspicious and fraudulent outcomes carry a fraud_risk alert.
    pub fn requires_alert(&self) -> bool {
        matches!(self, RiskLevel::Suspicious | RiskLevel::Fraudulent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    FraudRisk,
    EvaluationFailure,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::FraudRisk => "fraud_risk",
            AlertType::EvaluationFailure => "evaluation_failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fraud_risk" => Some(AlertType::FraudRisk),
            "evaluation_failure" => Some(AlertType::EvaluationFailure),
            _ => None,
        }
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// A transaction as submitted by the ingestion boundary, before an id
/// and a lifecycle are assigned.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub amount: f64,
    pub currency: String,
    pub location: Option<String>,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub transaction_time: DateTime<Utc>,
}

impl NewTransaction {
    /// Structural validation performed at the ingestion boundary.
    pub fn validate(&self) -> RiskResult<()> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(RiskError::Validation(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }
        let currency_ok =
            self.currency.len() == 3 && self.currency.chars().all(|c| c.is_ascii_alphabetic());
        if !currency_ok {
            return Err(RiskError::Validation(format!(
                "currency must be a 3-letter code, got '{}'",
                self.currency
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub amount: f64,
    pub currency: String,
    pub location: Option<String>,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub transaction_time: DateTime<Utc>,
    pub status: TransactionStatus,
    pub rule_score: Option<f64>,
    pub ml_score: Option<f64>,
    pub final_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn view(&self) -> TransactionView {
        TransactionView {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            amount: self.amount,
            currency: self.currency.clone(),
            status: self.status,
            rule_score: self.rule_score,
            ml_score: self.ml_score,
            final_score: self.final_score,
            risk_level: self.risk_level,
            transaction_time: self.transaction_time,
            updated_at: self.updated_at,
        }
    }
}

/// Read-model view served by the cache and the read API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub user_id: UserId,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub rule_score: Option<f64>,
    pub ml_score: Option<f64>,
    pub final_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub transaction_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub transaction_id: TransactionId,
    pub alert_type: AlertType,
    pub message: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// One row of the score audit trail: records which model version
/// produced a given set of scores.
#[derive(Debug, Clone)]
pub struct ScoreAudit {
    pub transaction_id: TransactionId,
    pub model_version: String,
    pub rule_score: f64,
    pub ml_score: f64,
    pub final_score: f64,
    pub created_at: DateTime<Utc>,
}
