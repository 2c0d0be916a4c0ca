//! Saga events and the envelope they travel in.

use common::{FaultToggles, OrderId, PaymentId};
use domain::{Order, Transaction};
use message_bus::Message;
use serde::{Deserialize, Serialize};

use crate::compensation::FailureOrigin;

/// Events that drive the checkout saga.
///
/// Decoding an envelope with a kind not listed here fails; there is no
/// catch-all variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum SagaEvent {
    /// An order was submitted.
    NewOrder(NewOrderData),

    /// The ledger debited the account for an order.
    NewOrderTransaction(NewOrderTransactionData),

    /// The payment was charged and accepted by the gateway.
    OrderSuccessPayment(PaymentSucceededData),

    /// The ledger debit failed.
    OrderAccountFailure(FailureData),

    /// The payment charge failed.
    OrderPaymentFailure(FailureData),

    /// The completion commit ran out of attempts.
    OrderCompletionFailure(FailureData),
}

impl SagaEvent {
    /// Returns the event kind tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaEvent::NewOrder(_) => "NewOrder",
            SagaEvent::NewOrderTransaction(_) => "NewOrderTransaction",
            SagaEvent::OrderSuccessPayment(_) => "OrderSuccessPayment",
            SagaEvent::OrderAccountFailure(_) => "OrderAccountFailure",
            SagaEvent::OrderPaymentFailure(_) => "OrderPaymentFailure",
            SagaEvent::OrderCompletionFailure(_) => "OrderCompletionFailure",
        }
    }

    /// Returns the order the event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            SagaEvent::NewOrder(data) => data.order.id,
            SagaEvent::NewOrderTransaction(data) => data.order.id,
            SagaEvent::OrderSuccessPayment(data) => data.order_id,
            SagaEvent::OrderAccountFailure(data)
            | SagaEvent::OrderPaymentFailure(data)
            | SagaEvent::OrderCompletionFailure(data) => data.order_id,
        }
    }

    /// Returns where a failure-class event originated, with its reason.
    pub fn failure(&self) -> Option<(FailureOrigin, &str)> {
        match self {
            SagaEvent::OrderAccountFailure(data) => {
                Some((FailureOrigin::LedgerDebit, data.reason.as_str()))
            }
            SagaEvent::OrderPaymentFailure(data) => {
                Some((FailureOrigin::PaymentCharge, data.reason.as_str()))
            }
            SagaEvent::OrderCompletionFailure(data) => {
                Some((FailureOrigin::CompletionCommit, data.reason.as_str()))
            }
            _ => None,
        }
    }
}

/// Data for NewOrder event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderData {
    pub order: Order,
}

/// Data for NewOrderTransaction event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderTransactionData {
    pub order: Order,
    /// The debit recorded for the order.
    pub transaction: Transaction,
}

/// Data for OrderSuccessPayment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
}

/// Data for failure-class events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureData {
    pub order_id: OrderId,
    /// Human-readable reason, ends up in the order's failure details.
    pub reason: String,
}

// Convenience constructors
impl SagaEvent {
    pub fn new_order(order: Order) -> Self {
        SagaEvent::NewOrder(NewOrderData { order })
    }

    pub fn new_order_transaction(order: Order, transaction: Transaction) -> Self {
        SagaEvent::NewOrderTransaction(NewOrderTransactionData { order, transaction })
    }

    pub fn order_success_payment(order_id: OrderId, payment_id: PaymentId) -> Self {
        SagaEvent::OrderSuccessPayment(PaymentSucceededData {
            order_id,
            payment_id,
        })
    }

    pub fn order_account_failure(order_id: OrderId, reason: impl Into<String>) -> Self {
        SagaEvent::OrderAccountFailure(FailureData {
            order_id,
            reason: reason.into(),
        })
    }

    pub fn order_payment_failure(order_id: OrderId, reason: impl Into<String>) -> Self {
        SagaEvent::OrderPaymentFailure(FailureData {
            order_id,
            reason: reason.into(),
        })
    }

    pub fn order_completion_failure(order_id: OrderId, reason: impl Into<String>) -> Self {
        SagaEvent::OrderCompletionFailure(FailureData {
            order_id,
            reason: reason.into(),
        })
    }
}

/// The orchestrator's unit of work.
///
/// Carries the fault-toggle snapshot taken when the order was submitted, so
/// every step of one saga sees the same configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaEnvelope {
    pub order_id: OrderId,
    pub event: SagaEvent,
    #[serde(default)]
    pub toggles: FaultToggles,
}

impl SagaEnvelope {
    /// Wraps an event, taking the order id from it.
    pub fn new(event: SagaEvent, toggles: FaultToggles) -> Self {
        Self {
            order_id: event.order_id(),
            event,
            toggles,
        }
    }

    /// Decodes an envelope from a bus message.
    pub fn from_message(message: &Message) -> message_bus::Result<Self> {
        message.decode()
    }

    /// Returns the event kind tag.
    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }
}
