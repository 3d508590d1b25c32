//! Transfer types
//!
//! The transfer command, the settlement status enum, and the bus payload
//! that drives the asynchronous confirmation loop.

use serde::{Deserialize, Serialize};

use super::Amount;

/// Settlement status of a transfer.
///
/// `Committed` and `CommitError` are terminal; `Submitted` means the
/// settlement system has accepted the transfer but not yet decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Submitted,
    Committed,
    CommitError,
}

impl TransferStatus {
    /// Terminal statuses are immutable once persisted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Committed | TransferStatus::CommitError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Submitted => "Submitted",
            TransferStatus::Committed => "Committed",
            TransferStatus::CommitError => "CommitError",
        }
    }
}

impl From<String> for TransferStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Committed" => TransferStatus::Committed,
            "CommitError" => TransferStatus::CommitError,
            _ => TransferStatus::Submitted,
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request to move coins from one address to another, debiting `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub user_id: i64,
    pub from_address: String,
    pub to_address: String,
    pub amount: Amount,
}

impl TransferRequest {
    pub fn new(
        user_id: i64,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Self {
            user_id,
            from_address: from_address.into(),
            to_address: to_address.into(),
            amount,
        }
    }
}

/// Payload of the pending-confirmation topic.
///
/// Carries a snapshot of the original request so the worker can finalize
/// the transfer without a ledger read, plus the retry count that drives
/// the backoff schedule. JSON on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationMessage {
    pub transaction_hash: String,
    pub status: TransferStatus,
    pub request: TransferRequest,
    pub retry_count: u32,
}

impl ConfirmationMessage {
    pub fn new(transaction_hash: impl Into<String>, status: TransferStatus, request: TransferRequest) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            status,
            request,
            retry_count: 0,
        }
    }

    /// The same message with the retry count bumped, for republishing.
    pub fn next_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
