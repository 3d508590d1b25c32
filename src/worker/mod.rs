//! Confirmation worker
//!
//! Consumes the pending-confirmation topic and drives each parked transfer
//! to a terminal state: poll settlement, finalize through the ledger's
//! idempotency gate, or reschedule with capped exponential backoff while
//! settlement is still undecided. The bus delivers at least once, so every
//! step tolerates duplicate invocation.

use std::sync::Arc;
use std::time::Duration;

use crate::bus::{BusSubscription, Delivery, MessageBus, PENDING_CONFIRMATION_TOPIC};
use crate::domain::{ConfirmationMessage, DomainError, TransferStatus};
use crate::ledger::{LedgerError, LedgerStore};
use crate::notify::FailureNotifier;
use crate::settlement::{SettlementClient, SettlementError};

/// Confirmation retry tuning. Values are configuration, not contract.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay before the first re-poll
    pub backoff_base: Duration,
    /// Ceiling for the backoff schedule
    pub backoff_max: Duration,
    /// Retries after which an undecided transfer is abandoned
    pub max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            max_retries: 10,
        }
    }
}

impl WorkerConfig {
    /// `min(backoff_max, backoff_base * 2^retry_count)`: non-decreasing in
    /// `retry_count`, capped, overflow-safe.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        let factor = 1u64 << retry_count.min(32);
        let delay = Duration::from_millis(base_ms.saturating_mul(factor));
        delay.min(self.backoff_max)
    }
}

/// Single logical consumer of the pending-confirmation topic.
pub struct ConfirmationWorker {
    ledger: Arc<dyn LedgerStore>,
    settlement: Arc<dyn SettlementClient>,
    bus: Arc<dyn MessageBus>,
    notifier: Arc<dyn FailureNotifier>,
    config: WorkerConfig,
}

impl ConfirmationWorker {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        settlement: Arc<dyn SettlementClient>,
        bus: Arc<dyn MessageBus>,
        notifier: Arc<dyn FailureNotifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            ledger,
            settlement,
            bus,
            notifier,
            config,
        }
    }

    /// Consumption loop. One bad message never halts it: decode failures
    /// and collaborator errors are handled per message.
    pub async fn run(self: Arc<Self>, mut subscription: BusSubscription) {
        tracing::info!("Confirmation worker started");

        while let Some(delivery) = subscription.recv().await {
            self.handle_delivery(delivery).await;
        }

        tracing::info!("Confirmation worker stopped: bus closed");
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let message = match ConfirmationMessage::from_bytes(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(
                    topic = %delivery.topic,
                    error = %e,
                    "Dropping malformed confirmation message"
                );
                return;
            }
        };

        self.process(message).await;
    }

    async fn process(&self, message: ConfirmationMessage) {
        let hash = message.transaction_hash.clone();

        let record = match self.settlement.query_status(&hash).await {
            Ok(record) => record,
            Err(SettlementError::Unreachable(reason)) => {
                // Infrastructure failure: keep the message alive for
                // redelivery instead of discarding it.
                tracing::warn!(
                    transaction_hash = %hash,
                    %reason,
                    "Settlement unreachable, rescheduling unchanged message"
                );
                self.schedule_republish(message, self.config.backoff_base);
                return;
            }
            Err(e) => {
                tracing::error!(
                    transaction_hash = %hash,
                    error = %e,
                    "Dropping confirmation message after settlement error"
                );
                return;
            }
        };

        match record.status {
            TransferStatus::Committed => self.finalize_committed(message).await,
            TransferStatus::CommitError => self.finalize_rejected(message).await,
            TransferStatus::Submitted => self.reschedule(message),
        }
    }

    /// Settlement committed: mutate the ledger exactly once, however many
    /// times this message is delivered.
    async fn finalize_committed(&self, message: ConfirmationMessage) {
        let hash = &message.transaction_hash;

        match self.ledger.find_by_hash(hash).await {
            Ok(Some(_)) => {
                tracing::debug!(
                    transaction_hash = %hash,
                    "Transfer already finalized, dropping duplicate delivery"
                );
                return;
            }
            Ok(None) => {}
            Err(e) if e.is_infrastructure() => {
                self.schedule_republish(message, self.config.backoff_base);
                return;
            }
            Err(e) => {
                tracing::error!(transaction_hash = %hash, error = %e, "Idempotency lookup failed");
                return;
            }
        }

        match self
            .ledger
            .apply_transfer(&message.request, TransferStatus::Committed, hash)
            .await
        {
            Ok(_) => {
                tracing::info!(
                    transaction_hash = %hash,
                    user_id = message.request.user_id,
                    "Transfer finalized as Committed"
                );
            }
            Err(LedgerError::Domain(DomainError::DuplicateTransaction(_))) => {
                // Lost the race against a concurrent delivery; the ledger
                // already holds the row.
                tracing::debug!(transaction_hash = %hash, "Concurrent delivery finalized first");
            }
            Err(e) if e.is_infrastructure() => {
                self.schedule_republish(message, self.config.backoff_base);
            }
            Err(e) => {
                // Retrying cannot help, e.g. the account has been drained
                // below the pending amount. Report it so the transfer does
                // not vanish without a trace.
                tracing::error!(
                    transaction_hash = %hash,
                    error = %e,
                    "Dropping confirmation message: finalization rejected by ledger"
                );
                self.notifier
                    .finalization_failed(hash, &message.request, &e.to_string());
            }
        }
    }

    /// Settlement rejected: record the terminal failure, notify, never retry.
    async fn finalize_rejected(&self, message: ConfirmationMessage) {
        let hash = &message.transaction_hash;

        match self
            .ledger
            .apply_transfer(&message.request, TransferStatus::CommitError, hash)
            .await
        {
            Ok(_) => {
                self.notifier.settlement_rejected(hash, &message.request);
            }
            Err(LedgerError::Domain(DomainError::DuplicateTransaction(_))) => {
                tracing::debug!(transaction_hash = %hash, "Rejection already recorded");
            }
            Err(e) if e.is_infrastructure() => {
                self.schedule_republish(message, self.config.backoff_base);
            }
            Err(e) => {
                tracing::error!(transaction_hash = %hash, error = %e, "Failed to record rejection");
            }
        }
    }

    /// Settlement still undecided: back off and republish, or abandon past
    /// the ceiling.
    fn reschedule(&self, message: ConfirmationMessage) {
        if message.retry_count >= self.config.max_retries {
            self.notifier.transfer_abandoned(
                &message.transaction_hash,
                &message.request,
                message.retry_count,
            );
            return;
        }

        let delay = self.config.retry_delay(message.retry_count);
        tracing::debug!(
            transaction_hash = %message.transaction_hash,
            retry_count = message.retry_count,
            delay_ms = delay.as_millis() as u64,
            "Settlement undecided, rescheduling confirmation"
        );
        self.schedule_republish(message.next_retry(), delay);
    }

    /// Republish after a delay without blocking the consumption loop.
    fn schedule_republish(&self, message: ConfirmationMessage, delay: Duration) {
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let payload = match message.to_bytes() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode confirmation message");
                    return;
                }
            };

            if let Err(e) = bus
                .publish(
                    PENDING_CONFIRMATION_TOPIC,
                    payload,
                    Some(message.request.user_id.to_string()),
                )
                .await
            {
                tracing::error!(
                    transaction_hash = %message.transaction_hash,
                    error = %e,
                    "Failed to republish confirmation message"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::domain::{Amount, TransferRequest};
    use crate::ledger::InMemoryLedger;
    use crate::notify::RecordingNotifier;
    use crate::settlement::ScriptedSettlement;
    use rust_decimal_macros::dec;

    struct Harness {
        ledger: Arc<InMemoryLedger>,
        settlement: Arc<ScriptedSettlement>,
        bus: Arc<InMemoryBus>,
        notifier: Arc<RecordingNotifier>,
        worker: Arc<ConfirmationWorker>,
    }

    fn harness(config: WorkerConfig) -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        let settlement = Arc::new(ScriptedSettlement::new());
        let bus = Arc::new(InMemoryBus::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let worker = Arc::new(ConfirmationWorker::new(
            ledger.clone(),
            settlement.clone(),
            bus.clone(),
            notifier.clone(),
            config,
        ));
        Harness {
            ledger,
            settlement,
            bus,
            notifier,
            worker,
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_millis(50),
            max_retries: 3,
        }
    }

    fn message(hash: &str, retry_count: u32) -> ConfirmationMessage {
        let request = TransferRequest::new(1, "0xfrom", "0xto", Amount::new(dec!(50)).unwrap());
        ConfirmationMessage {
            transaction_hash: hash.to_string(),
            status: TransferStatus::Submitted,
            request,
            retry_count,
        }
    }

    fn delivery(payload: Vec<u8>) -> Delivery {
        Delivery {
            topic: PENDING_CONFIRMATION_TOPIC.to_string(),
            partition_key: Some("1".to_string()),
            payload,
        }
    }

    #[test]
    fn test_retry_delay_non_decreasing_and_capped() {
        let config = WorkerConfig {
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            max_retries: 10,
        };

        let mut previous = Duration::ZERO;
        for retry_count in 0..20 {
            let delay = config.retry_delay(retry_count);
            assert!(delay >= previous, "delay decreased at retry {}", retry_count);
            assert!(delay <= config.backoff_max);
            previous = delay;
        }

        assert_eq!(config.retry_delay(0), Duration::from_secs(5));
        assert_eq!(config.retry_delay(1), Duration::from_secs(10));
        assert_eq!(config.retry_delay(2), Duration::from_secs(20));
        assert_eq!(config.retry_delay(19), Duration::from_secs(300));
        // Huge retry counts must not overflow
        assert_eq!(config.retry_delay(u32::MAX), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_committed_poll_finalizes_once() {
        let h = harness(fast_config());
        h.ledger.set_balance(1, dec!(100)).await;
        h.settlement
            .script_poll("0xaaa", &[TransferStatus::Committed])
            .await;

        let msg = message("0xaaa", 0);
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;
        // Duplicate delivery of the same message
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;

        assert_eq!(h.ledger.get_balance(1).await.unwrap().value(), dec!(50));
        assert_eq!(h.ledger.transaction_count().await, 1);
        assert_eq!(h.ledger.coin_logs(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_error_poll_records_and_notifies() {
        let h = harness(fast_config());
        h.ledger.set_balance(1, dec!(100)).await;
        h.settlement
            .script_poll("0xbbb", &[TransferStatus::CommitError])
            .await;

        let msg = message("0xbbb", 0);
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;

        // Balance untouched, one terminal row, one notification
        assert_eq!(h.ledger.get_balance(1).await.unwrap().value(), dec!(100));
        assert_eq!(h.ledger.transaction_count().await, 1);
        assert_eq!(h.notifier.rejected_count(), 1);

        let record = h.ledger.find_by_hash("0xbbb").await.unwrap().unwrap();
        assert_eq!(record.status, TransferStatus::CommitError);
    }

    #[tokio::test]
    async fn test_submitted_poll_republishes_with_bumped_retry() {
        let h = harness(fast_config());
        h.settlement
            .script_poll("0xccc", &[TransferStatus::Submitted])
            .await;
        let mut sub = h.bus.subscribe(PENDING_CONFIRMATION_TOPIC).await;

        let msg = message("0xccc", 1);
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;

        let redelivered = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("republish expected")
            .unwrap();
        let republished = ConfirmationMessage::from_bytes(&redelivered.payload).unwrap();
        assert_eq!(republished.retry_count, 2);
        assert_eq!(republished.transaction_hash, "0xccc");
        assert_eq!(redelivered.partition_key.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_retry_ceiling_abandons() {
        let h = harness(fast_config());
        h.settlement
            .script_poll("0xddd", &[TransferStatus::Submitted])
            .await;
        let mut sub = h.bus.subscribe(PENDING_CONFIRMATION_TOPIC).await;

        let msg = message("0xddd", 3); // at the ceiling
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;

        assert_eq!(h.notifier.abandoned_count(), 1);
        // Nothing republished
        assert!(tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_drained_account_confirmation_is_reported() {
        let h = harness(fast_config());
        // The account was drained below the pending amount before the
        // Committed confirmation arrived
        h.ledger.set_balance(1, dec!(10)).await;
        h.settlement
            .script_poll("0xfff", &[TransferStatus::Committed])
            .await;
        let mut sub = h.bus.subscribe(PENDING_CONFIRMATION_TOPIC).await;

        let msg = message("0xfff", 0);
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;

        // No ledger row, no retry, but the failure is reported
        assert!(h.ledger.find_by_hash("0xfff").await.unwrap().is_none());
        assert_eq!(h.ledger.get_balance(1).await.unwrap().value(), dec!(10));
        assert_eq!(h.notifier.finalization_failure_count(), 1);
        assert!(tokio::time::timeout(Duration::from_millis(50), sub.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_malformed_message_dropped() {
        let h = harness(fast_config());

        h.worker
            .handle_delivery(delivery(b"not a confirmation message".to_vec()))
            .await;

        assert_eq!(h.ledger.transaction_count().await, 0);
        assert_eq!(h.notifier.rejected_count(), 0);
        assert_eq!(h.notifier.abandoned_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_transaction_dropped_not_retried() {
        let h = harness(fast_config());
        // Nothing scripted for this hash: query_status answers
        // UnknownTransaction, a permanent collaborator error
        let mut sub = h.bus.subscribe(PENDING_CONFIRMATION_TOPIC).await;

        let msg = message("0xeee", 0);
        h.worker.handle_delivery(delivery(msg.to_bytes().unwrap())).await;

        assert!(tokio::time::timeout(Duration::from_millis(50), sub.recv())
            .await
            .is_err());
    }
}
