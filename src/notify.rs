//! Failure notification hook
//!
//! Invoked when settlement terminally rejects a transfer or the
//! confirmation loop gives up. Reporting only; the callee must not fail.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::domain::TransferRequest;

/// Hook for terminal transfer failures.
pub trait FailureNotifier: Send + Sync {
    /// Settlement answered `CommitError` for this transfer.
    fn settlement_rejected(&self, transaction_hash: &str, request: &TransferRequest);

    /// The retry ceiling was reached while settlement was still undecided.
    fn transfer_abandoned(&self, transaction_hash: &str, request: &TransferRequest, retries: u32);

    /// Settlement committed but the ledger refused to apply the transfer,
    /// e.g. the account was drained below the pending amount in the
    /// meantime. The transfer has no ledger row and needs operator action.
    fn finalization_failed(&self, transaction_hash: &str, request: &TransferRequest, reason: &str);
}

/// Production notifier: structured logs.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl FailureNotifier for LogNotifier {
    fn settlement_rejected(&self, transaction_hash: &str, request: &TransferRequest) {
        tracing::error!(
            transaction_hash,
            user_id = request.user_id,
            amount = %request.amount,
            "Settlement rejected transfer"
        );
    }

    fn transfer_abandoned(&self, transaction_hash: &str, request: &TransferRequest, retries: u32) {
        tracing::warn!(
            transaction_hash,
            user_id = request.user_id,
            retries,
            "Transfer abandoned: confirmation retry ceiling reached"
        );
    }

    fn finalization_failed(&self, transaction_hash: &str, request: &TransferRequest, reason: &str) {
        tracing::error!(
            transaction_hash,
            user_id = request.user_id,
            amount = %request.amount,
            reason,
            "Committed transfer could not be applied to the ledger"
        );
    }
}

/// Counting notifier for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    rejected: AtomicU32,
    abandoned: AtomicU32,
    finalization_failures: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejected_count(&self) -> u32 {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn abandoned_count(&self) -> u32 {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn finalization_failure_count(&self) -> u32 {
        self.finalization_failures.load(Ordering::SeqCst)
    }
}

impl FailureNotifier for RecordingNotifier {
    fn settlement_rejected(&self, _transaction_hash: &str, _request: &TransferRequest) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }

    fn transfer_abandoned(&self, _transaction_hash: &str, _request: &TransferRequest, _retries: u32) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
    }

    fn finalization_failed(&self, _transaction_hash: &str, _request: &TransferRequest, _reason: &str) {
        self.finalization_failures.fetch_add(1, Ordering::SeqCst);
    }
}
