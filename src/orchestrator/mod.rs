//! Transfer orchestrator
//!
//! Validates and initiates transfers: fast-fail balance pre-check,
//! synchronous settlement submit, then a branch on the returned status.
//! Immediate terminal statuses resolve in this call; `Submitted` parks the
//! transfer on the pending-confirmation topic and returns without blocking
//! the caller.

use std::sync::Arc;

use crate::bus::{BusError, MessageBus, PENDING_CONFIRMATION_TOPIC};
use crate::domain::{
    Balance, ConfirmationMessage, DomainError, TransferRequest, TransferStatus,
};
use crate::ledger::{CoinLog, LedgerError, LedgerStore, LedgerTransaction};
use crate::notify::FailureNotifier;
use crate::settlement::{SettlementClient, SettlementError};

/// Caller-visible result of `initiate_transfer`.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    /// Settlement committed synchronously; the ledger already reflects it.
    Completed(LedgerTransaction),
    /// Settlement is still deciding; the confirmation worker will finalize.
    Pending { transaction_hash: String },
}

/// Errors surfaced by the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Terminal settlement rejection; never retried.
    #[error("Settlement rejected transfer {transaction_hash}")]
    SettlementRejected { transaction_hash: String },

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Ledger failure: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Domain(domain) => TransferError::Domain(domain),
            other => TransferError::Ledger(other),
        }
    }
}

/// Entry point for transfer initiation, plus the read operations the
/// transport adapter exposes.
pub struct TransferOrchestrator {
    ledger: Arc<dyn LedgerStore>,
    settlement: Arc<dyn SettlementClient>,
    bus: Arc<dyn MessageBus>,
    notifier: Arc<dyn FailureNotifier>,
}

impl TransferOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        settlement: Arc<dyn SettlementClient>,
        bus: Arc<dyn MessageBus>,
        notifier: Arc<dyn FailureNotifier>,
    ) -> Self {
        Self {
            ledger,
            settlement,
            bus,
            notifier,
        }
    }

    /// Initiate a transfer.
    ///
    /// The balance pre-check is a fast fail only: it avoids a settlement
    /// call for requests that obviously cannot be covered. The lock inside
    /// `LedgerStore::apply_transfer` is what actually guarantees the
    /// balance never goes negative.
    pub async fn initiate_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferOutcome, TransferError> {
        let balance = self.ledger.get_balance(request.user_id).await?;
        if !balance.is_sufficient_for(&request.amount) {
            return Err(DomainError::insufficient_funds(
                request.amount.value(),
                balance.value(),
            )
            .into());
        }

        let receipt = self
            .settlement
            .submit(
                &request.from_address,
                &request.to_address,
                request.amount.value(),
            )
            .await?;

        match receipt.status {
            TransferStatus::Committed => {
                let record = self
                    .ledger
                    .apply_transfer(
                        &request,
                        TransferStatus::Committed,
                        &receipt.transaction_hash,
                    )
                    .await?;

                tracing::info!(
                    transaction_hash = %receipt.transaction_hash,
                    user_id = request.user_id,
                    "Transfer committed synchronously"
                );
                Ok(TransferOutcome::Completed(record))
            }
            TransferStatus::CommitError => {
                // Terminal rejection: no ledger mutation, never retried.
                self.notifier
                    .settlement_rejected(&receipt.transaction_hash, &request);
                Err(TransferError::SettlementRejected {
                    transaction_hash: receipt.transaction_hash,
                })
            }
            TransferStatus::Submitted => {
                let message = ConfirmationMessage::new(
                    receipt.transaction_hash.clone(),
                    TransferStatus::Submitted,
                    request.clone(),
                );

                // Partition by user id so confirmations for one account
                // stay ordered.
                self.bus
                    .publish(
                        PENDING_CONFIRMATION_TOPIC,
                        message.to_bytes().map_err(BusError::Encode)?,
                        Some(request.user_id.to_string()),
                    )
                    .await?;

                tracing::debug!(
                    transaction_hash = %receipt.transaction_hash,
                    user_id = request.user_id,
                    "Transfer pending settlement confirmation"
                );
                Ok(TransferOutcome::Pending {
                    transaction_hash: receipt.transaction_hash,
                })
            }
        }
    }

    /// Point-in-time balance for a user.
    pub async fn get_balance(&self, user_id: i64) -> Result<Balance, TransferError> {
        Ok(self.ledger.get_balance(user_id).await?)
    }

    /// Audit trail for a user, oldest first.
    pub async fn get_coin_logs(&self, user_id: i64) -> Result<Vec<CoinLog>, TransferError> {
        Ok(self.ledger.coin_logs(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::domain::Amount;
    use crate::ledger::InMemoryLedger;
    use crate::notify::RecordingNotifier;
    use crate::settlement::ScriptedSettlement;
    use rust_decimal_macros::dec;

    struct Harness {
        ledger: Arc<InMemoryLedger>,
        settlement: Arc<ScriptedSettlement>,
        bus: Arc<InMemoryBus>,
        notifier: Arc<RecordingNotifier>,
        orchestrator: TransferOrchestrator,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        let settlement = Arc::new(ScriptedSettlement::new());
        let bus = Arc::new(InMemoryBus::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = TransferOrchestrator::new(
            ledger.clone(),
            settlement.clone(),
            bus.clone(),
            notifier.clone(),
        );
        Harness {
            ledger,
            settlement,
            bus,
            notifier,
            orchestrator,
        }
    }

    fn request(amount: rust_decimal::Decimal) -> TransferRequest {
        TransferRequest::new(1, "0xfrom", "0xto", Amount::new(amount).unwrap())
    }

    #[tokio::test]
    async fn test_insufficient_funds_fails_before_settlement() {
        let h = harness();
        h.ledger.set_balance(1, dec!(100)).await;
        // No scripted submit: a settlement call would error out instead

        let result = h.orchestrator.initiate_transfer(request(dec!(150))).await;

        assert!(matches!(
            result,
            Err(TransferError::Domain(DomainError::InsufficientFunds { .. }))
        ));
        assert_eq!(h.ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_committed_settlement_applies_immediately() {
        let h = harness();
        h.ledger.set_balance(1, dec!(100)).await;
        h.settlement
            .script_submit(TransferStatus::Committed, "0xaaa")
            .await;

        let outcome = h
            .orchestrator
            .initiate_transfer(request(dec!(50)))
            .await
            .unwrap();

        match outcome {
            TransferOutcome::Completed(record) => {
                assert_eq!(record.status, TransferStatus::Committed);
                assert_eq!(record.transaction_hash, "0xaaa");
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        assert_eq!(h.ledger.get_balance(1).await.unwrap().value(), dec!(50));
        let logs = h.ledger.coin_logs(1).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].amount_changed, dec!(-50));
    }

    #[tokio::test]
    async fn test_commit_error_is_terminal_and_notifies() {
        let h = harness();
        h.ledger.set_balance(1, dec!(100)).await;
        h.settlement
            .script_submit(TransferStatus::CommitError, "0xbbb")
            .await;
        let mut sub = h.bus.subscribe(PENDING_CONFIRMATION_TOPIC).await;

        let result = h.orchestrator.initiate_transfer(request(dec!(50))).await;

        assert!(matches!(
            result,
            Err(TransferError::SettlementRejected { .. })
        ));
        assert_eq!(h.notifier.rejected_count(), 1);
        // No mutation, no retry scheduled
        assert_eq!(h.ledger.get_balance(1).await.unwrap().value(), dec!(100));
        assert_eq!(h.ledger.transaction_count().await, 0);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_submitted_publishes_confirmation_message() {
        let h = harness();
        h.ledger.set_balance(1, dec!(100)).await;
        h.settlement
            .script_submit(TransferStatus::Submitted, "0xccc")
            .await;
        let mut sub = h.bus.subscribe(PENDING_CONFIRMATION_TOPIC).await;

        let outcome = h
            .orchestrator
            .initiate_transfer(request(dec!(50)))
            .await
            .unwrap();

        match outcome {
            TransferOutcome::Pending { transaction_hash } => {
                assert_eq!(transaction_hash, "0xccc")
            }
            other => panic!("expected Pending, got {:?}", other),
        }

        // No ledger mutation yet
        assert_eq!(h.ledger.get_balance(1).await.unwrap().value(), dec!(100));
        assert_eq!(h.ledger.transaction_count().await, 0);

        let delivery = sub.recv().await.unwrap();
        assert_eq!(delivery.partition_key.as_deref(), Some("1"));
        let message = ConfirmationMessage::from_bytes(&delivery.payload).unwrap();
        assert_eq!(message.transaction_hash, "0xccc");
        assert_eq!(message.retry_count, 0);
        assert_eq!(message.request, request(dec!(50)));
    }

    #[tokio::test]
    async fn test_duplicate_transaction_surfaced() {
        let h = harness();
        h.ledger.set_balance(1, dec!(100)).await;
        h.settlement
            .script_submit(TransferStatus::Committed, "0xdup")
            .await;
        h.settlement
            .script_submit(TransferStatus::Committed, "0xdup")
            .await;

        h.orchestrator
            .initiate_transfer(request(dec!(10)))
            .await
            .unwrap();
        let result = h.orchestrator.initiate_transfer(request(dec!(10))).await;

        assert!(matches!(
            result,
            Err(TransferError::Domain(DomainError::DuplicateTransaction(_)))
        ));
        // First transfer stands alone
        assert_eq!(h.ledger.get_balance(1).await.unwrap().value(), dec!(90));
        assert_eq!(h.ledger.transaction_count().await, 1);
    }
}
