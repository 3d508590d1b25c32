//! In-memory ledger store
//!
//! Drop-in `LedgerStore` for tests and local runs. A single async mutex
//! over the whole state stands in for the per-account row lock: stricter
//! serialization than Postgres, identical observable behavior.

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Balance, DomainError, TransferRequest, TransferStatus};

use super::{CoinLog, LedgerError, LedgerStore, LedgerTransaction};

#[derive(Debug, Default)]
struct Inner {
    balances: std::collections::HashMap<i64, Decimal>,
    transactions: Vec<LedgerTransaction>,
    logs: Vec<CoinLog>,
}

/// Ledger store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a user's balance (test setup).
    pub async fn set_balance(&self, user_id: i64, balance: Decimal) {
        self.inner.lock().await.balances.insert(user_id, balance);
    }

    /// Total number of transaction rows. The duplicate-finalization tests
    /// assert on this; rows are stored as a plain list so a missed
    /// idempotency gate would show up as an extra row.
    pub async fn transaction_count(&self) -> usize {
        self.inner.lock().await.transactions.len()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedger {
    async fn apply_transfer(
        &self,
        request: &TransferRequest,
        status: TransferStatus,
        transaction_hash: &str,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut inner = self.inner.lock().await;

        if inner
            .transactions
            .iter()
            .any(|t| t.transaction_hash == transaction_hash)
        {
            return Err(DomainError::DuplicateTransaction(transaction_hash.to_string()).into());
        }

        let record = LedgerTransaction {
            id: Uuid::new_v4(),
            from_address: request.from_address.clone(),
            to_address: request.to_address.clone(),
            amount: request.amount.value(),
            transaction_hash: transaction_hash.to_string(),
            status,
            created_at: Utc::now(),
        };

        match status {
            TransferStatus::Committed => {
                let balance = *inner
                    .balances
                    .get(&request.user_id)
                    .ok_or(DomainError::AccountNotFound(request.user_id))?;
                let debited = balance - request.amount.value();

                if debited < Decimal::ZERO {
                    return Err(DomainError::insufficient_funds(
                        request.amount.value(),
                        balance,
                    )
                    .into());
                }

                inner.balances.insert(request.user_id, debited);
                inner.logs.push(CoinLog {
                    id: Uuid::new_v4(),
                    user_id: request.user_id,
                    transaction_id: record.id,
                    amount_changed: -request.amount.value(),
                    created_at: Utc::now(),
                });
            }
            TransferStatus::CommitError => {}
            TransferStatus::Submitted => {
                return Err(DomainError::NonTerminalStatus(status).into());
            }
        }

        inner.transactions.push(record.clone());

        Ok(record)
    }

    async fn find_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .iter()
            .find(|t| t.transaction_hash == transaction_hash)
            .cloned())
    }

    async fn get_balance(&self, user_id: i64) -> Result<Balance, LedgerError> {
        let inner = self.inner.lock().await;
        let value = *inner
            .balances
            .get(&user_id)
            .ok_or(DomainError::AccountNotFound(user_id))?;
        Balance::new(value).map_err(|e| DomainError::InvalidAmount(e.to_string()).into())
    }

    async fn coin_logs(&self, user_id: i64) -> Result<Vec<CoinLog>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }
}
