//! Settlement collaborator
//!
//! The external system of record that finally confirms or rejects a
//! transfer. Treated as a black box behind a two-operation contract; its
//! internal latency and retry model is not ours.

mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::TransferStatus;

pub use mock::{MockSettlement, ScriptedSettlement};

/// Response to submitting a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub status: TransferStatus,
    pub transaction_hash: String,
}

/// Current state of a previously submitted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub transaction_hash: String,
    pub status: TransferStatus,
    pub from: String,
    pub to: String,
    pub value: Decimal,
}

/// Settlement collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Settlement system unreachable: {0}")]
    Unreachable(String),

    #[error("Unknown transaction hash: {0}")]
    UnknownTransaction(String),
}

/// Two-operation settlement contract.
///
/// Production and deterministic-test implementations both satisfy it, so
/// the orchestrator and worker never know which one they talk to.
#[async_trait]
pub trait SettlementClient: Send + Sync {
    /// Submit a transfer. The returned status may already be terminal
    /// (`Committed`/`CommitError`) or still `Submitted`.
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SettlementReceipt, SettlementError>;

    /// Poll the current status of a submitted transfer.
    async fn query_status(&self, transaction_hash: &str)
        -> Result<SettlementRecord, SettlementError>;
}
