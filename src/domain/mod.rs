//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod error;
pub mod transfer;

pub use amount::{Amount, AmountError, Balance};
pub use error::DomainError;
pub use transfer::{ConfirmationMessage, TransferRequest, TransferStatus};
