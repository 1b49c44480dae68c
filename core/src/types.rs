//! Shared primitive types used across the entire pipeline.

/// A stable, unique transaction identifier (UUID v4 as text).
pub type TransactionId = String;

/// Identity of the user who owns a transaction.
pub type UserId = String;

/// A stable, unique alert identifier (UUID v4 as text).
pub type AlertId = String;
