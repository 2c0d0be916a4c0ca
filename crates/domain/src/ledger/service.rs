//! Ledger service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, TransactionId};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{Account, DEFAULT_ACCOUNT, DEFAULT_BALANCE, LedgerError, LedgerReceipt, Transaction};

/// Trait for ledger operations.
///
/// Debits and reversals are idempotent per order: repeating either returns
/// the transaction recorded the first time instead of moving money again.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Debits `amount` from the named account on behalf of an order.
    async fn debit(
        &self,
        order_id: OrderId,
        account_name: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<LedgerReceipt, LedgerError>;

    /// Credits back the debit recorded for an order.
    async fn reverse(
        &self,
        order_id: OrderId,
        description: &str,
    ) -> Result<LedgerReceipt, LedgerError>;

    /// Returns the named account.
    async fn account(&self, name: &str) -> Result<Account, LedgerError>;

    /// Returns every transaction recorded for an order, oldest first.
    async fn transactions_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Returns every transaction on an account, oldest first.
    async fn transactions_for_account(&self, name: &str) -> Result<Vec<Transaction>, LedgerError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    transactions: Vec<Transaction>,
    /// Index into `transactions` of the debit per order.
    debits: HashMap<OrderId, usize>,
    /// Index into `transactions` of the reversal per order.
    reversals: HashMap<OrderId, usize>,
}

impl LedgerState {
    fn record(&mut self, transaction: Transaction) -> (usize, Decimal) {
        let balance = self
            .balances
            .entry(transaction.account_name.clone())
            .or_default();
        *balance += transaction.amount;
        let balance = *balance;

        self.transactions.push(transaction);
        (self.transactions.len() - 1, balance)
    }

    fn receipt(&self, index: usize) -> Option<LedgerReceipt> {
        let transaction = self.transactions.get(index)?.clone();
        let balance = self
            .balances
            .get(&transaction.account_name)
            .copied()
            .unwrap_or_default();
        Some(LedgerReceipt {
            transaction,
            balance,
        })
    }
}

/// In-memory ledger.
///
/// All balance checks and mutations happen under one write lock, which gives
/// the same guarantee as a row-level balance check in a database.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates a ledger holding the default account at its opening balance.
    pub fn new() -> Self {
        Self::with_accounts([(DEFAULT_ACCOUNT, DEFAULT_BALANCE)])
    }

    /// Creates a ledger holding exactly the given accounts.
    pub fn with_accounts<'a>(accounts: impl IntoIterator<Item = (&'a str, Decimal)>) -> Self {
        let balances = accounts
            .into_iter()
            .map(|(name, balance)| (name.to_string(), balance))
            .collect();
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                balances,
                ..LedgerState::default()
            })),
        }
    }

    /// Returns the total number of transactions recorded.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl LedgerService for InMemoryLedger {
    #[tracing::instrument(skip(self))]
    async fn debit(
        &self,
        order_id: OrderId,
        account_name: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.write().await;

        if let Some(&index) = state.debits.get(&order_id)
            && let Some(receipt) = state.receipt(index)
        {
            tracing::debug!(%order_id, "debit already recorded, returning existing transaction");
            return Ok(receipt);
        }

        let balance = state
            .balances
            .get(account_name)
            .copied()
            .ok_or_else(|| LedgerError::AccountNotFound(account_name.to_string()))?;

        if balance - amount < Decimal::ZERO {
            return Err(LedgerError::InsufficientFunds {
                account: account_name.to_string(),
                balance,
                requested: amount,
            });
        }

        let transaction = Transaction {
            id: TransactionId::new(),
            order_id,
            account_name: account_name.to_string(),
            amount: -amount,
            creation_time: Utc::now(),
            description: description.to_string(),
        };
        let (index, balance) = state.record(transaction.clone());
        state.debits.insert(order_id, index);

        tracing::info!(%order_id, transaction_id = %transaction.id, %balance, "account debited");
        Ok(LedgerReceipt {
            transaction,
            balance,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn reverse(
        &self,
        order_id: OrderId,
        description: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        let mut state = self.state.write().await;

        if let Some(&index) = state.reversals.get(&order_id)
            && let Some(receipt) = state.receipt(index)
        {
            tracing::debug!(%order_id, "reversal already recorded, returning existing transaction");
            return Ok(receipt);
        }

        let original = state
            .debits
            .get(&order_id)
            .and_then(|&index| state.transactions.get(index))
            .cloned()
            .ok_or(LedgerError::OriginalTransactionNotFound(order_id))?;

        let transaction = Transaction {
            id: TransactionId::new(),
            order_id,
            account_name: original.account_name.clone(),
            amount: -original.amount,
            creation_time: Utc::now(),
            description: description.to_string(),
        };
        let (index, balance) = state.record(transaction.clone());
        state.reversals.insert(order_id, index);

        tracing::info!(%order_id, transaction_id = %transaction.id, %balance, "debit reversed");
        Ok(LedgerReceipt {
            transaction,
            balance,
        })
    }

    async fn account(&self, name: &str) -> Result<Account, LedgerError> {
        let state = self.state.read().await;
        state
            .balances
            .get(name)
            .map(|balance| Account {
                name: name.to_string(),
                balance: *balance,
            })
            .ok_or_else(|| LedgerError::AccountNotFound(name.to_string()))
    }

    async fn transactions_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn transactions_for_account(&self, name: &str) -> Result<Vec<Transaction>, LedgerError> {
        let state = self.state.read().await;
        if !state.balances.contains_key(name) {
            return Err(LedgerError::AccountNotFound(name.to_string()));
        }
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.account_name == name)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_debit_reduces_balance() {
        let ledger = InMemoryLedger::new();
        let order_id = OrderId::new();

        let receipt = ledger
            .debit(order_id, DEFAULT_ACCOUNT, dec!(100), "checkout")
            .await
            .unwrap();

        assert_eq!(receipt.transaction.amount, dec!(-100));
        assert_eq!(receipt.balance, dec!(99900));
        assert_eq!(
            ledger.account(DEFAULT_ACCOUNT).await.unwrap().balance,
            dec!(99900)
        );
    }

    #[tokio::test]
    async fn test_debit_rejects_non_positive_amount() {
        let ledger = InMemoryLedger::new();

        for amount in [dec!(0), dec!(-5)] {
            let result = ledger
                .debit(OrderId::new(), DEFAULT_ACCOUNT, amount, "checkout")
                .await;
            assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        }
        assert_eq!(ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_debit_rejects_overdraft() {
        let ledger = InMemoryLedger::with_accounts([("Small", dec!(50))]);

        let result = ledger
            .debit(OrderId::new(), "Small", dec!(50.01), "checkout")
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));

        // Draining to exactly zero is allowed.
        ledger
            .debit(OrderId::new(), "Small", dec!(50), "checkout")
            .await
            .unwrap();
        assert_eq!(ledger.account("Small").await.unwrap().balance, dec!(0));
    }

    #[tokio::test]
    async fn test_debit_unknown_account() {
        let ledger = InMemoryLedger::new();
        let result = ledger
            .debit(OrderId::new(), "Missing", dec!(1), "checkout")
            .await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_repeated_debit_is_idempotent() {
        let ledger = InMemoryLedger::new();
        let order_id = OrderId::new();

        let first = ledger
            .debit(order_id, DEFAULT_ACCOUNT, dec!(100), "checkout")
            .await
            .unwrap();
        let second = ledger
            .debit(order_id, DEFAULT_ACCOUNT, dec!(100), "checkout")
            .await
            .unwrap();

        assert_eq!(first.transaction.id, second.transaction.id);
        assert_eq!(second.balance, dec!(99900));
        assert_eq!(ledger.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_reverse_restores_balance() {
        let ledger = InMemoryLedger::new();
        let order_id = OrderId::new();
        ledger
            .debit(order_id, DEFAULT_ACCOUNT, dec!(100), "checkout")
            .await
            .unwrap();

        let receipt = ledger.reverse(order_id, "refund").await.unwrap();
        assert_eq!(receipt.transaction.amount, dec!(100));
        assert_eq!(receipt.balance, DEFAULT_BALANCE);

        // Reversing twice does not credit twice.
        let again = ledger.reverse(order_id, "refund").await.unwrap();
        assert_eq!(again.transaction.id, receipt.transaction.id);
        assert_eq!(
            ledger.account(DEFAULT_ACCOUNT).await.unwrap().balance,
            DEFAULT_BALANCE
        );

        let amounts: Vec<Decimal> = ledger
            .transactions_for_order(order_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.amount)
            .collect();
        assert_eq!(amounts, vec![dec!(-100), dec!(100)]);
    }

    #[tokio::test]
    async fn test_reverse_without_debit() {
        let ledger = InMemoryLedger::new();
        let result = ledger.reverse(OrderId::new(), "refund").await;
        assert!(matches!(result, Err(LedgerError::OriginalTransactionNotFound(_))));
    }

    #[tokio::test]
    async fn test_transactions_for_account() {
        let ledger = InMemoryLedger::new();
        ledger
            .debit(OrderId::new(), DEFAULT_ACCOUNT, dec!(10), "a")
            .await
            .unwrap();
        ledger
            .debit(OrderId::new(), DEFAULT_ACCOUNT, dec!(20), "b")
            .await
            .unwrap();

        let transactions = ledger
            .transactions_for_account(DEFAULT_ACCOUNT)
            .await
            .unwrap();
        assert_eq!(transactions.len(), 2);
        assert!(ledger.transactions_for_account("Missing").await.is_err());
    }
}
