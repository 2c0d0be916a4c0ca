//! Domain error types.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::order::OrderError;
use crate::payment::PaymentError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),
}

impl DomainError {
    /// Returns true for rejected input, which is never retried.
    pub fn is_validation(&self) -> bool {
        match self {
            DomainError::Ledger(e) => e.is_validation(),
            DomainError::Payment(e) => e.is_validation(),
            DomainError::Order(e) => e.is_validation(),
        }
    }

    /// Returns true if a referenced record does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            DomainError::Ledger(e) => e.is_not_found(),
            DomainError::Payment(e) => e.is_not_found(),
            DomainError::Order(e) => e.is_not_found(),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
