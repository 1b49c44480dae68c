//! Alert persistence and resolution.

use super::{parse_ts, RiskStore};
use crate::error::RiskResult;
use crate::transaction::{Alert, AlertType};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Insert an alert unless one with the same (transaction, type) cause
/// already exists. Runs inside the outcome writer's transaction so the
/// alert becomes visible together with the terminal status.
pub(crate) fn insert_alert_guarded(
    conn: &Connection,
    transaction_id: &str,
    alert_type: AlertType,
    message: &str,
    created_at: &str,
) -> RiskResult<()> {
    conn.execute(
        "INSERT INTO alerts (id, transaction_id, alert_type, message, resolved, created_at)
         SELECT ?1, ?2, ?3, ?4, 0, ?5
          WHERE NOT EXISTS (
             SELECT 1 FROM alerts WHERE transaction_id=?2 AND alert_type=?3
          )",
        params![
            Uuid::new_v4().to_string(),
            transaction_id,
            alert_type.as_str(),
            message,
            created_at,
        ],
    )?;
    Ok(())
}

impl RiskStore {
    pub fn unresolved_alerts(&self) -> RiskResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, transaction_id, alert_type, message, resolved, created_at
             FROM alerts WHERE resolved=0
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], row_to_alert)?;
        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    pub fn alerts_for_transaction(&self, transaction_id: &str) -> RiskResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, transaction_id, alert_type, message, resolved, created_at
             FROM alerts WHERE transaction_id=?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![transaction_id], row_to_alert)?;
        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    pub fn alert_count(&self, transaction_id: &str, alert_type: AlertType) -> RiskResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE transaction_id=?1 AND alert_type=?2",
            params![transaction_id, alert_type.as_str()],
            |r| r.get(0),
        )?)
    }

    pub fn unresolved_alert_count(&self) -> RiskResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM alerts WHERE resolved=0", [], |r| {
                r.get(0)
            })?)
    }

    /// Flip an alert to resolved. Mutates only the alert row, never
    /// the referenced transaction. Returns false for an unknown id.
    pub fn resolve_alert(&self, alert_id: &str) -> RiskResult<bool> {
        let updated = self.conn.execute(
            "UPDATE alerts SET resolved=1 WHERE id=?1",
            params![alert_id],
        )?;
        Ok(updated > 0)
    }
}

fn row_to_alert(r: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let type_raw: String = r.get(2)?;
    let alert_type = AlertType::parse(&type_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown alert type '{type_raw}'").into(),
        )
    })?;
    Ok(Alert {
        id: r.get(0)?,
        transaction_id: r.get(1)?,
        alert_type,
        message: r.get(3)?,
        resolved: r.get::<_, i64>(4)? != 0,
        created_at: parse_ts(&r.get::<_, String>(5)?, 5)?,
    })
}
