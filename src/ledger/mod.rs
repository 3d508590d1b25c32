//! Ledger module
//!
//! Durable balance/transaction/audit storage. `LedgerStore` is the only
//! component allowed to mutate persisted state; the orchestrator and the
//! confirmation worker request mutations through it.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Balance, DomainError, TransferRequest, TransferStatus};

pub use memory::InMemoryLedger;
pub use postgres::PgLedgerStore;

/// A persisted transfer. `transaction_hash` is globally unique and serves
/// as the idempotency key; terminal rows are never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub transaction_hash: String,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry: exactly one per successful balance mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinLog {
    pub id: Uuid,
    pub user_id: i64,
    pub transaction_id: Uuid,
    pub amount_changed: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Ledger store errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// Infrastructure failures warrant redelivery; domain failures don't.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, LedgerError::Database(_))
    }
}

/// Storage contract for balances, transactions and coin logs.
///
/// Implementations must make `apply_transfer` atomic: the transaction row,
/// the coin log and the balance update become visible together or not at
/// all, and concurrent transfers on the same account serialize on a lock
/// scoped to that account.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically record a transfer that reached a terminal settlement
    /// status.
    ///
    /// - `Committed`: locks the source account, debits it (failing with
    ///   `InsufficientFunds` if the balance would go negative), writes the
    ///   transaction row and the coin log.
    /// - `CommitError`: writes the terminal transaction row only; balances
    ///   are untouched.
    /// - `Submitted` is rejected with `NonTerminalStatus`.
    ///
    /// Fails with `DuplicateTransaction` if `transaction_hash` was already
    /// recorded.
    async fn apply_transfer(
        &self,
        request: &TransferRequest,
        status: TransferStatus,
        transaction_hash: &str,
    ) -> Result<LedgerTransaction, LedgerError>;

    /// Idempotency lookup: the finalization gate for orchestrator and
    /// worker alike.
    async fn find_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<LedgerTransaction>, LedgerError>;

    /// Point-in-time balance read. Used as a fast-fail pre-check only; the
    /// lock inside `apply_transfer` is the source of correctness.
    async fn get_balance(&self, user_id: i64) -> Result<Balance, LedgerError>;

    /// Audit trail for a user, oldest first.
    async fn coin_logs(&self, user_id: i64) -> Result<Vec<CoinLog>, LedgerError>;
}
