//! Store Errors
//!
//! Error types for ledger store operations.

use uuid::Uuid;

use crate::domain::SettlementStatus;

/// Errors that can occur in the ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Row version differs from the one the caller read
    #[error("Concurrency conflict for row {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict { id: Uuid, expected: i64, actual: i64 },

    /// A row selected for settlement is no longer eligible
    #[error("Row {id} is no longer unsettled (status {status}, version {version})")]
    NotSettleable {
        id: Uuid,
        status: SettlementStatus,
        version: i64,
    },

    /// The rows of a settlement do not add up to the deposited amount
    #[error("Settlement amount mismatch: rows sum to {rows_net}, deposit is {deposit}")]
    AmountMismatch {
        rows_net: rust_decimal::Decimal,
        deposit: rust_decimal::Decimal,
    },

    /// A posting with this id was already written
    #[error("Posting already recorded: {0}")]
    DuplicatePosting(Uuid),

    /// Settled rows cannot be updated
    #[error("Row {0} is settled and immutable")]
    Immutable(Uuid),

    /// Row not found
    #[error("Row not found: {0}")]
    NotFound(Uuid),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data violates a domain invariant
    #[error("Corrupt row data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::NotSettleable { .. }
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. }
                | StoreError::NotSettleable { .. }
                | StoreError::Database(_)
        )
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
