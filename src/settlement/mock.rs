//! Mock settlement implementations
//!
//! `MockSettlement` stands in for the real settlement system in local
//! runs: it accepts every transfer with a configurable status and a random
//! transaction hash. `ScriptedSettlement` is the deterministic variant for
//! tests, replaying a prepared sequence of statuses per transfer.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use rand::RngCore;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::domain::TransferStatus;

use super::{SettlementClient, SettlementError, SettlementReceipt, SettlementRecord};

fn random_hash() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

#[derive(Debug, Clone)]
struct Submitted {
    from: String,
    to: String,
    value: Decimal,
}

/// Demo settlement collaborator: every submit succeeds with `submit_status`
/// and a random hash, every poll answers `poll_status`.
#[derive(Debug)]
pub struct MockSettlement {
    submit_status: TransferStatus,
    poll_status: TransferStatus,
    submitted: Mutex<HashMap<String, Submitted>>,
}

impl MockSettlement {
    /// Everything commits immediately.
    pub fn new() -> Self {
        Self::with_statuses(TransferStatus::Committed, TransferStatus::Committed)
    }

    /// Choose what `submit` and `query_status` answer.
    pub fn with_statuses(submit_status: TransferStatus, poll_status: TransferStatus) -> Self {
        Self {
            submit_status,
            poll_status,
            submitted: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MockSettlement {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementClient for MockSettlement {
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SettlementReceipt, SettlementError> {
        let transaction_hash = random_hash();

        self.submitted.lock().await.insert(
            transaction_hash.clone(),
            Submitted {
                from: from.to_string(),
                to: to.to_string(),
                value: amount,
            },
        );

        Ok(SettlementReceipt {
            status: self.submit_status,
            transaction_hash,
        })
    }

    async fn query_status(
        &self,
        transaction_hash: &str,
    ) -> Result<SettlementRecord, SettlementError> {
        let submitted = self.submitted.lock().await;
        let record = submitted
            .get(transaction_hash)
            .ok_or_else(|| SettlementError::UnknownTransaction(transaction_hash.to_string()))?;

        Ok(SettlementRecord {
            transaction_hash: transaction_hash.to_string(),
            status: self.poll_status,
            from: record.from.clone(),
            to: record.to.clone(),
            value: record.value,
        })
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    /// Statuses handed out by `submit`, in call order.
    submit_script: VecDeque<(TransferStatus, String)>,
    /// Per-hash status sequences for `query_status`; the last entry sticks.
    poll_scripts: HashMap<String, VecDeque<TransferStatus>>,
    submitted: HashMap<String, Submitted>,
    poll_counts: HashMap<String, u32>,
}

/// Deterministic settlement collaborator for tests.
#[derive(Debug, Default)]
pub struct ScriptedSettlement {
    state: Mutex<ScriptState>,
}

impl ScriptedSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the receipt the next `submit` call returns.
    pub async fn script_submit(&self, status: TransferStatus, transaction_hash: &str) {
        self.state
            .lock()
            .await
            .submit_script
            .push_back((status, transaction_hash.to_string()));
    }

    /// Queue the statuses successive `query_status` calls for `hash`
    /// return. Once the queue runs dry the last status repeats.
    pub async fn script_poll(&self, transaction_hash: &str, statuses: &[TransferStatus]) {
        self.state
            .lock()
            .await
            .poll_scripts
            .insert(transaction_hash.to_string(), statuses.iter().copied().collect());
    }

    /// How many times `query_status` was called for `hash`.
    pub async fn poll_count(&self, transaction_hash: &str) -> u32 {
        self.state
            .lock()
            .await
            .poll_counts
            .get(transaction_hash)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SettlementClient for ScriptedSettlement {
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SettlementReceipt, SettlementError> {
        let mut state = self.state.lock().await;

        let (status, transaction_hash) = state
            .submit_script
            .pop_front()
            .ok_or_else(|| SettlementError::Unreachable("no scripted submit".to_string()))?;

        state.submitted.insert(
            transaction_hash.clone(),
            Submitted {
                from: from.to_string(),
                to: to.to_string(),
                value: amount,
            },
        );

        Ok(SettlementReceipt {
            status,
            transaction_hash,
        })
    }

    async fn query_status(
        &self,
        transaction_hash: &str,
    ) -> Result<SettlementRecord, SettlementError> {
        let mut state = self.state.lock().await;

        *state
            .poll_counts
            .entry(transaction_hash.to_string())
            .or_insert(0) += 1;

        let script = state
            .poll_scripts
            .get_mut(transaction_hash)
            .ok_or_else(|| SettlementError::UnknownTransaction(transaction_hash.to_string()))?;

        let status = if script.len() > 1 {
            script.pop_front().unwrap_or(TransferStatus::Submitted)
        } else {
            script
                .front()
                .copied()
                .unwrap_or(TransferStatus::Submitted)
        };

        let (from, to, value) = state
            .submitted
            .get(transaction_hash)
            .map(|s| (s.from.clone(), s.to.clone(), s.value))
            .unwrap_or_else(|| (String::new(), String::new(), Decimal::ZERO));

        Ok(SettlementRecord {
            transaction_hash: transaction_hash.to_string(),
            status,
            from,
            to,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_generates_unique_hashes() {
        let settlement = MockSettlement::new();

        let a = settlement.submit("0xa", "0xb", dec!(1)).await.unwrap();
        let b = settlement.submit("0xa", "0xb", dec!(1)).await.unwrap();

        assert_eq!(a.status, TransferStatus::Committed);
        assert!(a.transaction_hash.starts_with("0x"));
        assert_eq!(a.transaction_hash.len(), 66);
        assert_ne!(a.transaction_hash, b.transaction_hash);
    }

    #[tokio::test]
    async fn test_mock_query_returns_submitted_details() {
        let settlement =
            MockSettlement::with_statuses(TransferStatus::Submitted, TransferStatus::Committed);

        let receipt = settlement.submit("0xa", "0xb", dec!(25)).await.unwrap();
        assert_eq!(receipt.status, TransferStatus::Submitted);

        let record = settlement
            .query_status(&receipt.transaction_hash)
            .await
            .unwrap();
        assert_eq!(record.status, TransferStatus::Committed);
        assert_eq!(record.from, "0xa");
        assert_eq!(record.to, "0xb");
        assert_eq!(record.value, dec!(25));
    }

    #[tokio::test]
    async fn test_mock_unknown_hash() {
        let settlement = MockSettlement::new();
        assert!(matches!(
            settlement.query_status("0xdeadbeef").await,
            Err(SettlementError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_scripted_poll_sequence_last_status_sticks() {
        let settlement = ScriptedSettlement::new();
        settlement
            .script_poll(
                "0x1",
                &[
                    TransferStatus::Submitted,
                    TransferStatus::Submitted,
                    TransferStatus::Committed,
                ],
            )
            .await;

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(settlement.query_status("0x1").await.unwrap().status);
        }

        assert_eq!(
            seen,
            vec![
                TransferStatus::Submitted,
                TransferStatus::Submitted,
                TransferStatus::Committed,
                TransferStatus::Committed,
                TransferStatus::Committed,
            ]
        );
        assert_eq!(settlement.poll_count("0x1").await, 5);
    }
}
