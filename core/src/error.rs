use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RiskError {
    /// Whether redelivery may succeed where this attempt failed.
    /// Validation errors are never retryable; model-load errors are
    /// fatal at startup and never reach the retry path.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RiskError::Database(_) | RiskError::Scoring(_))
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
