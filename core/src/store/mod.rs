//! SQLite persistence layer.
//!
//! RULE: Only the store modules talk to the database.
//! Pipeline stages call store methods — they never execute SQL directly.
//! The store is also the single source of truth for the claim
//! transition: one conditional UPDATE, not a distributed lock.

use crate::error::RiskResult;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

mod alert;
mod transaction;

pub use transaction::ClaimOutcome;

pub struct RiskStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file/URI
}

impl RiskStore {
    pub fn open(path: &str) -> RiskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (single-connection tests).
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a throwaway file-backed database under the system temp
    /// directory. Multi-connection tests need this; a plain in-memory
    /// database cannot be shared across connections.
    pub fn temp(tag: &str) -> RiskResult<Self> {
        let path = std::env::temp_dir().join(format!("riskgate-{tag}-{}.db", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{path}-wal"));
        let _ = std::fs::remove_file(format!("{path}-shm"));
        Self::open(&path)
    }

    /// Reopen a new connection to the same database. Each worker gets
    /// its own connection this way.
    /// For plain in-memory databases this returns a new isolated
    /// database; worker pools must be built on a file-backed store.
    pub fn reopen(&self) -> RiskResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RiskResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_transactions.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_alerts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_score_audit.sql"))?;
        Ok(())
    }
}

// ── Timestamp helpers ────────────────────────────────────────────────────────
// Timestamps are stored as RFC 3339 UTC text; with a fixed +00:00 offset
// the lexicographic order matches the chronological order.

pub(crate) fn format_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub(crate) fn parse_ts(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
