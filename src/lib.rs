//! coin-ledger
//!
//! Per-user coin balances and address-to-address transfers, reconciled
//! against an external settlement system whose confirmation can be
//! immediate or delayed. The ledger mutates balances atomically and
//! idempotently per transfer; a bus-fed confirmation worker drives pending
//! transfers to a terminal state with capped exponential backoff.

pub mod app;
pub mod bus;
pub mod domain;
pub mod ledger;
pub mod notify;
pub mod orchestrator;
pub mod settlement;
pub mod worker;

// Binary support modules
pub mod config;
pub mod db;

pub use app::App;
pub use config::Config;
pub use domain::{Amount, AmountError, Balance, ConfirmationMessage, DomainError};
pub use domain::{TransferRequest, TransferStatus};
pub use ledger::{CoinLog, LedgerError, LedgerStore, LedgerTransaction};
pub use orchestrator::{TransferError, TransferOrchestrator, TransferOutcome};
pub use worker::{ConfirmationWorker, WorkerConfig};
