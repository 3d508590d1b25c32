//! Postgres ledger store
//!
//! Relational implementation of `LedgerStore`. The per-account serialization
//! point is a `SELECT ... FOR UPDATE` on the source `coins` row; everything
//! `apply_transfer` writes happens inside one database transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{Balance, DomainError, TransferRequest, TransferStatus};

use super::{CoinLog, LedgerError, LedgerStore, LedgerTransaction};

/// Ledger store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the source account row and return its balance.
    async fn lock_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<Decimal, LedgerError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT balance FROM coins WHERE user_id = $1 FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        balance.ok_or_else(|| DomainError::AccountNotFound(user_id).into())
    }

    async fn insert_transaction(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        request: &TransferRequest,
        status: TransferStatus,
        transaction_hash: &str,
    ) -> Result<LedgerTransaction, LedgerError> {
        let id = Uuid::new_v4();

        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (
                id, from_address, to_address, amount, transaction_hash, status
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING created_at
            "#,
        )
        .bind(id)
        .bind(&request.from_address)
        .bind(&request.to_address)
        .bind(request.amount.value())
        .bind(transaction_hash)
        .bind(status.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(e, transaction_hash))?;

        Ok(LedgerTransaction {
            id,
            from_address: request.from_address.clone(),
            to_address: request.to_address.clone(),
            amount: request.amount.value(),
            transaction_hash: transaction_hash.to_string(),
            status,
            created_at,
        })
    }

    async fn insert_coin_log(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        transaction_id: Uuid,
        amount_changed: Decimal,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO coin_logs (id, user_id, transaction_id, amount_changed)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(transaction_id)
        .bind(amount_changed)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn update_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        new_balance: Decimal,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE coins SET balance = $2, updated_at = NOW() WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(new_balance)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

/// The UNIQUE constraint on `transaction_hash` is the last line of defense
/// against concurrent finalization of the same transfer.
fn map_unique_violation(e: sqlx::Error, transaction_hash: &str) -> LedgerError {
    let is_unique = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if is_unique {
        DomainError::DuplicateTransaction(transaction_hash.to_string()).into()
    } else {
        LedgerError::Database(e)
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgLedgerStore {
    async fn apply_transfer(
        &self,
        request: &TransferRequest,
        status: TransferStatus,
        transaction_hash: &str,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;

        // Idempotency gate, same transaction as the writes
        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM transactions WHERE transaction_hash = $1
            "#,
        )
        .bind(transaction_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            return Err(DomainError::DuplicateTransaction(transaction_hash.to_string()).into());
        }

        let record = match status {
            TransferStatus::Committed => {
                let balance = self.lock_balance(&mut tx, request.user_id).await?;
                let debited = balance - request.amount.value();

                if debited < Decimal::ZERO {
                    return Err(DomainError::insufficient_funds(
                        request.amount.value(),
                        balance,
                    )
                    .into());
                }

                let record = self
                    .insert_transaction(&mut tx, request, status, transaction_hash)
                    .await?;
                self.insert_coin_log(
                    &mut tx,
                    request.user_id,
                    record.id,
                    -request.amount.value(),
                )
                .await?;
                self.update_balance(&mut tx, request.user_id, debited).await?;

                tracing::info!(
                    user_id = request.user_id,
                    transaction_hash,
                    new_balance = %debited,
                    "Committed transfer applied"
                );

                record
            }
            TransferStatus::CommitError => {
                // Terminal failure: record the transaction, leave balances
                // untouched, append no coin log.
                self.insert_transaction(&mut tx, request, status, transaction_hash)
                    .await?
            }
            TransferStatus::Submitted => {
                return Err(DomainError::NonTerminalStatus(status).into());
            }
        };

        tx.commit().await?;

        Ok(record)
    }

    async fn find_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        let row: Option<(
            Uuid,
            String,
            String,
            Decimal,
            String,
            String,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT id, from_address, to_address, amount, transaction_hash, status, created_at
            FROM transactions
            WHERE transaction_hash = $1
            "#,
        )
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, from_address, to_address, amount, transaction_hash, status, created_at)| {
                LedgerTransaction {
                    id,
                    from_address,
                    to_address,
                    amount,
                    transaction_hash,
                    status: TransferStatus::from(status),
                    created_at,
                }
            },
        ))
    }

    async fn get_balance(&self, user_id: i64) -> Result<Balance, LedgerError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT balance FROM coins WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let value = balance.ok_or(DomainError::AccountNotFound(user_id))?;
        Balance::new(value)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()).into())
    }

    async fn coin_logs(&self, user_id: i64) -> Result<Vec<CoinLog>, LedgerError> {
        let rows: Vec<(Uuid, i64, Uuid, Decimal, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, user_id, transaction_id, amount_changed, created_at
            FROM coin_logs
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, user_id, transaction_id, amount_changed, created_at)| CoinLog {
                    id,
                    user_id,
                    transaction_id,
                    amount_changed,
                    created_at,
                },
            )
            .collect())
    }
}
