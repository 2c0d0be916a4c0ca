//! Payment domain: charges against a ledger transaction and their gateway.

mod service;

pub use service::{InMemoryPayments, PaymentService};

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a payment.
///
/// The only transition is `Submitted -> Failed`, taken under compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Submitted,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Submitted => "Submitted",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A charge made for an order. The amount is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub creation_time: DateTime<Utc>,
}

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// A charge must carry a negative amount.
    #[error("Invalid payment amount: {0}")]
    InvalidAmount(Decimal),

    /// A charge must reference the ledger transaction it pays for.
    #[error("Payment requires a transaction id")]
    MissingTransaction,

    /// The external processor declined the charge.
    #[error("Payment gateway declined payment {payment_id}: {reason}")]
    GatewayFailure { payment_id: PaymentId, reason: String },

    #[error("No payment found for order {0}")]
    PaymentNotFound(OrderId),

    #[error("Payment not found: {0}")]
    UnknownPayment(PaymentId),
}

impl PaymentError {
    /// Returns true for errors caused by bad input rather than payment state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PaymentError::InvalidAmount(_) | PaymentError::MissingTransaction
        )
    }

    /// Returns true if the referenced payment does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PaymentError::PaymentNotFound(_) | PaymentError::UnknownPayment(_)
        )
    }
}
