//! Saga error types.

use common::OrderId;
use domain::{DomainError, LedgerError, OrderError, PaymentError};
use message_bus::BusError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga step failed and could not be turned into a failure event.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A message bus operation failed.
    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    /// A domain service rejected an operation.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The saga progress database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No progress record exists for the order.
    #[error("No saga progress for order {0}")]
    ProgressNotFound(OrderId),
}

impl SagaError {
    /// Creates a step failure.
    pub fn step_failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        SagaError::StepFailed {
            step: step.into(),
            reason: reason.into(),
        }
    }
}

impl From<LedgerError> for SagaError {
    fn from(e: LedgerError) -> Self {
        SagaError::Domain(e.into())
    }
}

impl From<PaymentError> for SagaError {
    fn from(e: PaymentError) -> Self {
        SagaError::Domain(e.into())
    }
}

impl From<OrderError> for SagaError {
    fn from(e: OrderError) -> Self {
        SagaError::Domain(e.into())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
