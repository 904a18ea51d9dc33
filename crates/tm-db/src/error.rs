//! Error types for tm-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Internal error (D007)
    #[error("[D007] Internal database error: {0}")]
    Internal(String),

    /// Lock already held by another holder (D008)
    #[error("[D008] Lock '{key}' is held by {holder}")]
    LockHeld { key: String, holder: String },

    /// BEGIN / COMMIT / ROLLBACK failure (D009)
    #[error("[D009] Transaction failed: {0}")]
    TransactionError(String),

    /// A ledger row could not be decoded (D010)
    #[error("[D010] Invalid ledger row: {0}")]
    LedgerDecode(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        DbError::ExecutionError(err.to_string())
    }
}
