//! Ledger domain: accounts and the transactions that move their balance.

mod service;

pub use service::{InMemoryLedger, LedgerService};

use chrono::{DateTime, Utc};
use common::{OrderId, TransactionId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Account every checkout is debited from.
pub const DEFAULT_ACCOUNT: &str = "Default";

/// Opening balance of the [`DEFAULT_ACCOUNT`].
pub const DEFAULT_BALANCE: Decimal = dec!(100000);

/// A named balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub balance: Decimal,
}

/// An immutable ledger movement.
///
/// Negative amounts are debits, positive amounts are reversal credits. A
/// reversal is a new transaction for the same order, never an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub order_id: OrderId,
    pub account_name: String,
    pub amount: Decimal,
    pub creation_time: DateTime<Utc>,
    pub description: String,
}

impl Transaction {
    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative()
    }

    pub fn is_reversal(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }
}

/// Outcome of a ledger movement: the transaction and the balance after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction: Transaction,
    pub balance: Decimal,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A debit must move a positive amount out of the account.
    #[error("Invalid debit amount: {0}")]
    InvalidAmount(Decimal),

    /// The debit would drive the balance below zero.
    #[error("Not enough balance in account '{account}': balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: String,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// A reversal was requested for an order that was never debited.
    #[error("No debit transaction found for order {0}")]
    OriginalTransactionNotFound(OrderId),
}

impl LedgerError {
    /// Returns true for errors caused by bad input rather than ledger state.
    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::InvalidAmount(_))
    }

    /// Returns true if a referenced account or transaction does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::AccountNotFound(_) | LedgerError::OriginalTransactionNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(amount: Decimal) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            order_id: OrderId::new(),
            account_name: DEFAULT_ACCOUNT.to_string(),
            amount,
            creation_time: Utc::now(),
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_sign_classifies_transaction() {
        assert!(transaction(dec!(-100)).is_debit());
        assert!(!transaction(dec!(-100)).is_reversal());
        assert!(transaction(dec!(100)).is_reversal());
        assert!(!transaction(dec!(100)).is_debit());
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = LedgerError::InsufficientFunds {
            account: "Default".to_string(),
            balance: dec!(50),
            requested: dec!(100),
        };
        assert!(err.to_string().starts_with("Not enough balance"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_error_classification() {
        assert!(LedgerError::InvalidAmount(dec!(0)).is_validation());
        assert!(LedgerError::AccountNotFound("x".to_string()).is_not_found());
        assert!(LedgerError::OriginalTransactionNotFound(OrderId::new()).is_not_found());
    }
}
