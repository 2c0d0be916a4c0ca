//! Integration tests for the ledger, payment and order services.
//!
//! These tests drive the three domains the way the saga does, without a
//! bus in between, and check the cross-domain invariants.

use std::sync::Arc;

use common::{FaultToggles, OrderId};
use domain::{
    DEFAULT_ACCOUNT, DEFAULT_BALANCE, DomainError, InMemoryLedger, InMemoryOrders,
    InMemoryPayments, LedgerError, LedgerService, OrderService, OrderStatus, PaymentError,
    PaymentService, PaymentStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod checkout_flow {
    use super::*;

    #[tokio::test]
    async fn successful_checkout_moves_money_once() {
        let ledger = InMemoryLedger::new();
        let payments = InMemoryPayments::new();
        let orders = InMemoryOrders::new();

        let order = orders.create(dec!(100)).await.unwrap();
        let receipt = ledger
            .debit(order.id, DEFAULT_ACCOUNT, order.amount, "checkout")
            .await
            .unwrap();
        let payment = payments
            .charge(order.id, receipt.transaction.id, receipt.transaction.amount)
            .await
            .unwrap();
        payments
            .request_gateway(payment.id, payment.amount, &FaultToggles::default())
            .await
            .unwrap();
        let order = orders.mark_success(order.id).await.unwrap();

        assert_eq!(order.status, OrderStatus::Successful);
        assert_eq!(payment.amount, dec!(-100));
        assert_eq!(payment.status, PaymentStatus::Submitted);
        assert_eq!(
            ledger.account(DEFAULT_ACCOUNT).await.unwrap().balance,
            dec!(99900)
        );
        let transactions = ledger.transactions_for_order(order.id).await.unwrap();
        assert_eq!(transactions.len(), 1);
    }

    #[tokio::test]
    async fn declined_gateway_is_fully_compensated() {
        let ledger = InMemoryLedger::new();
        let payments = InMemoryPayments::new();
        let orders = InMemoryOrders::new();
        let toggles = FaultToggles {
            should_external_payment_fail: true,
            ..FaultToggles::default()
        };

        let order = orders.create(dec!(100)).await.unwrap();
        let receipt = ledger
            .debit(order.id, DEFAULT_ACCOUNT, order.amount, "checkout")
            .await
            .unwrap();
        let payment = payments
            .charge(order.id, receipt.transaction.id, receipt.transaction.amount)
            .await
            .unwrap();
        let declined = payments
            .request_gateway(payment.id, payment.amount, &toggles)
            .await
            .unwrap_err();

        payments.mark_failed(order.id).await.unwrap();
        ledger.reverse(order.id, "payment failed").await.unwrap();
        let order = orders
            .mark_failed(order.id, &declined.to_string())
            .await
            .unwrap();

        let amounts: Vec<Decimal> = ledger
            .transactions_for_order(order.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.amount)
            .collect();
        assert_eq!(amounts, vec![dec!(-100), dec!(100)]);
        assert_eq!(
            ledger.account(DEFAULT_ACCOUNT).await.unwrap().balance,
            DEFAULT_BALANCE
        );
        let payment = payments.payment_for_order(order.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(order.status, OrderStatus::Failed);
        assert!(order.failure_details.unwrap().contains("declined"));
    }
}

mod ledger_concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let ledger = Arc::new(InMemoryLedger::with_accounts([("Shared", dec!(1000))]));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .debit(OrderId::new(), "Shared", dec!(100), "concurrent")
                    .await
            }));
        }

        let mut succeeded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientFunds { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(rejected, 15);
        assert_eq!(ledger.account("Shared").await.unwrap().balance, dec!(0));
    }

    #[tokio::test]
    async fn concurrent_redelivery_of_one_debit_applies_once() {
        let ledger = Arc::new(InMemoryLedger::new());
        let order_id = OrderId::new();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .debit(order_id, DEFAULT_ACCOUNT, dec!(100), "redelivered")
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let transactions = ledger.transactions_for_order(order_id).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(
            ledger.account(DEFAULT_ACCOUNT).await.unwrap().balance,
            dec!(99900)
        );
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn domain_errors_wrap_service_errors() {
        let payments = InMemoryPayments::new();

        let err: DomainError = payments
            .mark_failed(OrderId::new())
            .await
            .unwrap_err()
            .into();
        assert!(err.is_not_found());
        assert!(matches!(err, DomainError::Payment(PaymentError::PaymentNotFound(_))));
    }
}
