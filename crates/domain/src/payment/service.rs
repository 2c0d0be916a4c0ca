//! Payment service trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{FaultToggles, OrderId, PaymentId, TransactionId};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{Payment, PaymentError, PaymentStatus};

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Records a charge for an order. Idempotent per order.
    async fn charge(
        &self,
        order_id: OrderId,
        transaction_id: TransactionId,
        amount: Decimal,
    ) -> Result<Payment, PaymentError>;

    /// Submits a recorded charge to the external processor.
    async fn request_gateway(
        &self,
        payment_id: PaymentId,
        amount: Decimal,
        toggles: &FaultToggles,
    ) -> Result<(), PaymentError>;

    /// Marks the payment of an order as failed.
    async fn mark_failed(&self, order_id: OrderId) -> Result<Payment, PaymentError>;

    /// Asks the external processor to refund a payment.
    async fn request_refund(&self, payment_id: PaymentId) -> Result<(), PaymentError>;

    /// Returns the payment recorded for an order, if any.
    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>, PaymentError>;
}

#[derive(Debug, Default)]
struct PaymentState {
    payments: HashMap<PaymentId, Payment>,
    by_order: HashMap<OrderId, PaymentId>,
    refunds: HashSet<PaymentId>,
    gateway_requests: usize,
}

/// In-memory payment store with a simulated gateway.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPayments {
    state: Arc<RwLock<PaymentState>>,
}

impl InMemoryPayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of payments recorded.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Returns true if a refund was requested for the payment.
    pub async fn refund_requested(&self, payment_id: PaymentId) -> bool {
        self.state.read().await.refunds.contains(&payment_id)
    }

    /// Returns how many times the gateway was called.
    pub async fn gateway_request_count(&self) -> usize {
        self.state.read().await.gateway_requests
    }
}

#[async_trait]
impl PaymentService for InMemoryPayments {
    #[tracing::instrument(skip(self))]
    async fn charge(
        &self,
        order_id: OrderId,
        transaction_id: TransactionId,
        amount: Decimal,
    ) -> Result<Payment, PaymentError> {
        if transaction_id.is_nil() {
            return Err(PaymentError::MissingTransaction);
        }
        if amount >= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(amount));
        }

        let mut state = self.state.write().await;

        if let Some(existing) = state
            .by_order
            .get(&order_id)
            .and_then(|id| state.payments.get(id))
        {
            tracing::debug!(%order_id, payment_id = %existing.id, "payment already recorded");
            return Ok(existing.clone());
        }

        let payment = Payment {
            id: PaymentId::new(),
            order_id,
            transaction_id,
            amount,
            status: PaymentStatus::Submitted,
            creation_time: Utc::now(),
        };
        state.by_order.insert(order_id, payment.id);
        state.payments.insert(payment.id, payment.clone());

        tracing::info!(%order_id, payment_id = %payment.id, "payment submitted");
        Ok(payment)
    }

    #[tracing::instrument(skip(self, toggles))]
    async fn request_gateway(
        &self,
        payment_id: PaymentId,
        amount: Decimal,
        toggles: &FaultToggles,
    ) -> Result<(), PaymentError> {
        let mut state = self.state.write().await;
        if !state.payments.contains_key(&payment_id) {
            return Err(PaymentError::UnknownPayment(payment_id));
        }
        state.gateway_requests += 1;

        if toggles.should_external_payment_fail {
            tracing::warn!(%payment_id, "payment gateway declined charge");
            return Err(PaymentError::GatewayFailure {
                payment_id,
                reason: "External payment failed".to_string(),
            });
        }

        tracing::info!(%payment_id, "payment gateway accepted charge");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn mark_failed(&self, order_id: OrderId) -> Result<Payment, PaymentError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let payment = state
            .by_order
            .get(&order_id)
            .and_then(|id| state.payments.get_mut(id))
            .ok_or(PaymentError::PaymentNotFound(order_id))?;

        if payment.status != PaymentStatus::Failed {
            payment.status = PaymentStatus::Failed;
            tracing::info!(%order_id, payment_id = %payment.id, "payment marked failed");
        }
        Ok(payment.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn request_refund(&self, payment_id: PaymentId) -> Result<(), PaymentError> {
        let mut state = self.state.write().await;
        if !state.payments.contains_key(&payment_id) {
            return Err(PaymentError::UnknownPayment(payment_id));
        }
        if state.refunds.insert(payment_id) {
            tracing::info!(%payment_id, "refund requested");
        }
        Ok(())
    }

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>, PaymentError> {
        let state = self.state.read().await;
        Ok(state
            .by_order
            .get(&order_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }
}
