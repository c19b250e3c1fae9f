//! Database error types.

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON column could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Record already exists
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Input rejected before reaching the database.
    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationError),

    /// Segment query rejected by the guard.
    #[error("segment query rejected: {0}")]
    QueryRejected(String),

    /// Segment query exceeded its time budget.
    #[error("segment query timed out after {0} seconds")]
    QueryTimeout(u64),

    /// No claimable promo code left.
    #[error("no unused promo codes left in batch {batch_id}")]
    Exhausted { batch_id: String },

    /// Batch exists but cannot be claimed from right now.
    #[error("promo code batch {batch_id} is not redeemable: {reason}")]
    BatchUnavailable { batch_id: String, reason: String },

    /// Execution already reached a terminal state.
    #[error("execution {0} is already finished")]
    ExecutionFinished(String),
}

impl DatabaseError {
    /// Map a unique-constraint violation to `AlreadyExists`.
    pub(crate) fn from_insert(err: sqlx::Error, entity: &'static str, id: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity,
                    id: id.to_string(),
                };
            }
        }
        DatabaseError::Sqlx(err)
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
