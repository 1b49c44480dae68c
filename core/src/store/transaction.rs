//! Transaction persistence: ingestion insert, the claim transition,
//! history aggregates, and the atomic outcome commit.

use super::{alert, format_ts, parse_ts, RiskStore};
use crate::combiner::EvaluationOutcome;
use crate::error::RiskResult;
use crate::features::HistoryStats;
use crate::transaction::{
    AlertType, NewTransaction, RiskLevel, ScoreAudit, Transaction, TransactionStatus,
};
use chrono::{Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

/// Result of one attempt to claim a transaction for processing.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This worker now owns the transaction.
    Claimed(Transaction),
    /// A first-attempt duplicate observed the transaction already in
    /// flight; the delivery is discarded as a no-op.
    InFlight,
    /// The transaction already reached a terminal state.
    AlreadyFinal(TransactionStatus),
    /// No such transaction row.
    NotFound,
}

impl RiskStore {
    // ── Ingestion ──────────────────────────────────────────────

    /// Persist a freshly submitted transaction in `pending` state and
    /// return it with its generated id.
    pub fn insert_transaction(&self, new: &NewTransaction) -> RiskResult<Transaction> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO transactions
                 (id, user_id, amount, currency, location, device_id, ip_address,
                  transaction_time, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id,
                new.user_id,
                new.amount,
                new.currency,
                new.location,
                new.device_id,
                new.ip_address,
                format_ts(&new.transaction_time),
                TransactionStatus::Pending.as_str(),
                format_ts(&now),
            ],
        )?;
        Ok(Transaction {
            id,
            user_id: new.user_id.clone(),
            amount: new.amount,
            currency: new.currency.clone(),
            location: new.location.clone(),
            device_id: new.device_id.clone(),
            ip_address: new.ip_address.clone(),
            transaction_time: new.transaction_time,
            status: TransactionStatus::Pending,
            rule_score: None,
            ml_score: None,
            final_score: None,
            risk_level: None,
            created_at: now,
            updated_at: now,
        })
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn get_transaction(&self, id: &str) -> RiskResult<Option<Transaction>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, amount, currency, location, device_id, ip_address,
                        transaction_time, status, rule_score, ml_score, final_score,
                        risk_level, created_at, updated_at
                 FROM transactions WHERE id=?1",
                params![id],
                row_to_transaction,
            )
            .optional()?)
    }

    pub fn transaction_status(&self, id: &str) -> RiskResult<Option<TransactionStatus>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM transactions WHERE id=?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|s| TransactionStatus::parse(&s)))
    }

    pub fn transaction_count(&self) -> RiskResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))?)
    }

    pub fn count_with_status(&self, status: TransactionStatus) -> RiskResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE status=?1",
            params![status.as_str()],
            |r| r.get(0),
        )?)
    }

    /// Short-term aggregates over the lookback window, strictly prior
    /// to this transaction (the row itself is excluded).
    pub fn history_stats(
        &self,
        txn: &Transaction,
        window_minutes: i64,
    ) -> RiskResult<HistoryStats> {
        let window_start = format_ts(&(txn.transaction_time - Duration::minutes(window_minutes)));
        let txn_time = format_ts(&txn.transaction_time);

        let recent_user_txns: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE user_id=?1 AND id<>?2 AND transaction_time>=?3 AND transaction_time<?4",
            params![txn.user_id, txn.id, window_start, txn_time],
            |r| r.get(0),
        )?;

        let (recent_device_txns, device_seen_before) = match &txn.device_id {
            Some(device) => {
                let recent: i64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM transactions
                     WHERE user_id=?1 AND device_id=?2 AND id<>?3
                       AND transaction_time>=?4 AND transaction_time<?5",
                    params![txn.user_id, device, txn.id, window_start, txn_time],
                    |r| r.get(0),
                )?;
                let ever: i64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM transactions
                     WHERE user_id=?1 AND device_id=?2 AND id<>?3 AND transaction_time<?4",
                    params![txn.user_id, device, txn.id, txn_time],
                    |r| r.get(0),
                )?;
                (recent, ever > 0)
            }
            None => (0, false),
        };

        let last_location: Option<String> = self
            .conn
            .query_row(
                "SELECT location FROM transactions
                 WHERE user_id=?1 AND id<>?2 AND transaction_time<?3 AND location IS NOT NULL
                 ORDER BY transaction_time DESC LIMIT 1",
                params![txn.user_id, txn.id, txn_time],
                |r| r.get(0),
            )
            .optional()?;

        Ok(HistoryStats {
            recent_user_txns,
            recent_device_txns,
            device_seen_before,
            last_location,
        })
    }

    // ── Claim transition ───────────────────────────────────────

    /// Atomic conditional claim: pending → processing, guarded by the
    /// current status. Redeliveries (attempt > 1) may re-claim a
    /// `processing` transaction abandoned by a failed attempt; first
    /// deliveries must not, so a duplicate of an in-flight job is
    /// discarded as a no-op. Terminal states always no-op.
    pub fn claim_transaction(&self, id: &str, attempt: u32) -> RiskResult<ClaimOutcome> {
        let now = format_ts(&Utc::now());
        let mut claimed = self.conn.execute(
            "UPDATE transactions SET status=?2, updated_at=?3
             WHERE id=?1 AND status=?4",
            params![
                id,
                TransactionStatus::Processing.as_str(),
                now,
                TransactionStatus::Pending.as_str()
            ],
        )?;
        if claimed == 0 && attempt > 1 {
            // The prior attempt crashed or failed after claiming.
            claimed = self.conn.execute(
                "UPDATE transactions SET updated_at=?2
                 WHERE id=?1 AND status=?3",
                params![id, now, TransactionStatus::Processing.as_str()],
            )?;
        }
        if claimed == 1 {
            return match self.get_transaction(id)? {
                Some(txn) => Ok(ClaimOutcome::Claimed(txn)),
                None => Ok(ClaimOutcome::NotFound),
            };
        }
        match self.transaction_status(id)? {
            None => Ok(ClaimOutcome::NotFound),
            Some(status) if status.is_terminal() => Ok(ClaimOutcome::AlreadyFinal(status)),
            Some(_) => Ok(ClaimOutcome::InFlight),
        }
    }

    // ── Outcome writer ─────────────────────────────────────────

    /// Commit a completed evaluation as one atomic unit: scores, risk
    /// level, terminal status, the score-audit row, and (for suspicious
    /// or fraudulent outcomes) exactly one fraud_risk alert.
    ///
    /// Returns false when the status guard misses: the transaction was
    /// no longer `processing`, so another delivery already finalized it
    /// and this commit is a benign no-op.
    pub fn finalize_outcome(&self, id: &str, outcome: &EvaluationOutcome) -> RiskResult<bool> {
        let tx =
            rusqlite::Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let now = format_ts(&Utc::now());
        let updated = tx.execute(
            "UPDATE transactions
                SET rule_score=?2, ml_score=?3, final_score=?4, risk_level=?5,
                    status=?6, updated_at=?7
              WHERE id=?1 AND status=?8",
            params![
                id,
                outcome.rule_score,
                outcome.ml_score,
                outcome.final_score,
                outcome.risk_level.as_str(),
                outcome.status.as_str(),
                now,
                TransactionStatus::Processing.as_str(),
            ],
        )?;
        if updated == 0 {
            return Ok(false); // dropped tx rolls back
        }
        tx.execute(
            "INSERT INTO score_audit
                 (transaction_id, model_version, rule_score, ml_score, final_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                outcome.model_version,
                outcome.rule_score,
                outcome.ml_score,
                outcome.final_score,
                now,
            ],
        )?;
        if outcome.risk_level.requires_alert() {
            let verb = match outcome.status {
                TransactionStatus::Rejected => "rejected",
                _ => "flagged for review",
            };
            let message = format!(
                "Transaction {} {} with final_score={:.4} (ml={:.4}, rules={:.4})",
                id, verb, outcome.final_score, outcome.ml_score, outcome.rule_score
            );
            alert::insert_alert_guarded(&tx, id, AlertType::FraudRisk, &message, &now)?;
        }
        tx.commit()?;
        Ok(true)
    }

    /// Terminal failure path: `evaluation_failed` plus exactly one
    /// evaluation_failure alert, committed atomically. Score fields
    /// stay unset. Idempotent: a transaction that already reached a
    /// terminal state is left untouched.
    pub fn finalize_failure(&self, id: &str, reason: &str) -> RiskResult<bool> {
        let tx =
            rusqlite::Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let now = format_ts(&Utc::now());
        let updated = tx.execute(
            "UPDATE transactions SET status=?2, updated_at=?3
              WHERE id=?1 AND status IN (?4, ?5)",
            params![
                id,
                TransactionStatus::EvaluationFailed.as_str(),
                now,
                TransactionStatus::Pending.as_str(),
                TransactionStatus::Processing.as_str(),
            ],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        let message = format!("Evaluation of transaction {id} failed permanently: {reason}");
        alert::insert_alert_guarded(&tx, id, AlertType::EvaluationFailure, &message, &now)?;
        tx.commit()?;
        Ok(true)
    }

    // ── Audit trail ────────────────────────────────────────────

    pub fn score_audits(&self, transaction_id: &str) -> RiskResult<Vec<ScoreAudit>> {
        let mut stmt = self.conn.prepare(
            "SELECT transaction_id, model_version, rule_score, ml_score, final_score, created_at
             FROM score_audit WHERE transaction_id=?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![transaction_id], |r| {
            Ok(ScoreAudit {
                transaction_id: r.get(0)?,
                model_version: r.get(1)?,
                rule_score: r.get(2)?,
                ml_score: r.get(3)?,
                final_score: r.get(4)?,
                created_at: parse_ts(&r.get::<_, String>(5)?, 5)?,
            })
        })?;
        let mut audits = Vec::new();
        for row in rows {
            audits.push(row?);
        }
        Ok(audits)
    }
}

fn row_to_transaction(r: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let status_raw: String = r.get(8)?;
    let status = TransactionStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            Type::Text,
            format!("unknown status '{status_raw}'").into(),
        )
    })?;
    let risk_raw: Option<String> = r.get(12)?;
    let risk_level = match risk_raw {
        Some(raw) => Some(RiskLevel::parse(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                12,
                Type::Text,
                format!("unknown risk level '{raw}'").into(),
            )
        })?),
        None => None,
    };
    Ok(Transaction {
        id: r.get(0)?,
        user_id: r.get(1)?,
        amount: r.get(2)?,
        currency: r.get(3)?,
        location: r.get(4)?,
        device_id: r.get(5)?,
        ip_address: r.get(6)?,
        transaction_time: parse_ts(&r.get::<_, String>(7)?, 7)?,
        status,
        rule_score: r.get(9)?,
        ml_score: r.get(10)?,
        final_score: r.get(11)?,
        risk_level,
        created_at: parse_ts(&r.get::<_, String>(13)?, 13)?,
        updated_at: parse_ts(&r.get::<_, String>(14)?, 14)?,
    })
}
