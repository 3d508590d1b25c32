//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::TransferStatus;

/// Business rule violations and domain invariant failures.
///
/// These are independent of the store/bus/transport layers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Debit would take the balance below zero
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    /// The transaction hash has already been finalized (idempotency key hit)
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// No coin balance row exists for the user
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    /// Invalid amount (zero, negative, too many decimals)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Attempt to persist a non-terminal settlement status.
    /// Submitted transfers stay off the ledger until confirmed.
    #[error("Cannot persist non-terminal status {0}")]
    NonTerminalStatus(TransferStatus),
}

impl DomainError {
    pub fn insufficient_funds(
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    ) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Check if this is a client error (the request's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. } | Self::InvalidAmount(_) | Self::AccountNotFound(_)
        )
    }

    /// Duplicate finalization is benign under at-least-once delivery
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateTransaction(_))
    }
}
