//! Error types for the deduplicating consumer

use thiserror::Error;

/// Result type for dedup operations
pub type DedupResult<T> = Result<T, DedupError>;

/// Errors that can occur while guarding message consumption
#[derive(Error, Debug)]
pub enum DedupError {
    /// Database operation failed (connection, query execution, etc.)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis operation failed (connection, command execution, etc.)
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Invalid configuration, detected when the strategy is built
    #[error("invalid dedup configuration: {0}")]
    Config(String),

    /// The business callback failed with an error. This is the only variant
    /// surfaced by `invoke`; the transport layer applies its own redelivery
    /// policy to it.
    #[error("message processing failed: {0}")]
    Processing(#[source] anyhow::Error),
}

impl DedupError {
    /// Check if the error is a unique-constraint violation (a lost claim race).
    ///
    /// This is NOT an error condition for claiming - it is the signal that
    /// another consumer already holds the record.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            DedupError::Database(sqlx_err) => {
                // PostgreSQL unique violation error code: 23505
                if let Some(db_err) = sqlx_err.as_database_error() {
                    db_err.code().as_deref() == Some("23505")
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}
