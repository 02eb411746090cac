//! Ledger error types.

use thiserror::Error;

use crate::game::entities::Chips;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Insufficient balance
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Chips, required: Chips },

    /// Account not found
    #[error("account not found for player {0}")]
    AccountNotFound(String),

    /// Invalid amount (must be positive)
    #[error("invalid amount: {0}")]
    InvalidAmount(Chips),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
