use std::sync::Arc;

use async_trait::async_trait;
use message_bus::{Acknowledger, Message, MessageHandler};

use super::{decode, emit, unexpected};
use crate::activity::SUBJECT_PAYMENT;
use crate::commands::SagaCommand;
use crate::envelope::SagaEvent;
use crate::error::{Result, SagaError};
use crate::scope::SagaScope;

/// Charges the payment for a debited order and submits it to the gateway.
pub struct PaymentChargeHandler;

#[async_trait]
impl MessageHandler<SagaScope> for PaymentChargeHandler {
    type Error = SagaError;

    fn name(&self) -> &str {
        "payment-charge"
    }

    #[tracing::instrument(skip_all, fields(scope = scope.id))]
    async fn handle(
        &self,
        message: Message,
        _ack: Arc<dyn Acknowledger>,
        scope: SagaScope,
    ) -> Result<()> {
        let envelope = decode(&message)?;
        let toggles = envelope.toggles;
        let SagaCommand::MakePayment {
            order_id,
            transaction_id,
            amount,
        } = &envelope.command
        else {
            return Err(unexpected(self.name(), &envelope.command));
        };

        let (order_id, transaction_id, amount) = (*order_id, *transaction_id, *amount);

        scope
            .log(SUBJECT_PAYMENT, &["[TRANS - Make payment]"])
            .await;

        if toggles.should_internal_payment_fail {
            let reason = "Payment failed: internal payment rejected by configuration";
            tracing::warn!(%order_id, "internal payment failure injected");
            scope
                .log(SUBJECT_PAYMENT, &[&format!("[EXCEPTION] {reason}")])
                .await;
            return emit(
                &scope,
                SagaEvent::order_payment_failure(order_id, reason),
                toggles,
            )
            .await;
        }

        let payment = match scope
            .payments
            .charge(order_id, transaction_id, amount)
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                let reason = format!("Payment failed: {e}");
                tracing::warn!(%order_id, error = %e, "payment charge rejected");
                scope
                    .log(SUBJECT_PAYMENT, &[&format!("[EXCEPTION] {reason}")])
                    .await;
                return emit(
                    &scope,
                    SagaEvent::order_payment_failure(order_id, reason),
                    toggles,
                )
                .await;
            }
        };

        let gateway = tokio::time::timeout(
            scope.retry.attempt_timeout,
            scope
                .payments
                .request_gateway(payment.id, payment.amount, &toggles),
        )
        .await;
        let declined = match gateway {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("Payment failed: {e}")),
            Err(_) => Some("Payment failed: payment gateway timed out".to_string()),
        };

        match declined {
            None => {
                tracing::info!(%order_id, payment_id = %payment.id, "payment accepted");
                scope
                    .log(SUBJECT_PAYMENT, &["[EVENT - Payment succeeded]"])
                    .await;
                emit(
                    &scope,
                    SagaEvent::order_success_payment(order_id, payment.id),
                    toggles,
                )
                .await
            }
            Some(reason) => {
                tracing::warn!(
                    %order_id,
                    payment_id = %payment.id,
                    reason = %reason,
                    "payment declined"
                );
                // The orchestrator still has to hear about the decline.
                if let Err(e) = scope.payments.mark_failed(order_id).await {
                    tracing::error!(%order_id, error = %e, "could not mark payment failed");
                }
                scope
                    .log(SUBJECT_PAYMENT, &[&format!("[EXCEPTION] {reason}")])
                    .await;
                emit(
                    &scope,
                    SagaEvent::order_payment_failure(order_id, reason),
                    toggles,
                )
                .await
            }
        }
    }
}

/// Fails the payment of an order whose completion could not be committed
/// and asks the gateway for a refund.
pub struct PaymentFailHandler;

#[async_trait]
impl MessageHandler<SagaScope> for PaymentFailHandler {
    type Error = SagaError;

    fn name(&self) -> &str {
        "payment-fail"
    }

    #[tracing::instrument(skip_all, fields(scope = scope.id))]
    async fn handle(
        &self,
        message: Message,
        _ack: Arc<dyn Acknowledger>,
        scope: SagaScope,
    ) -> Result<()> {
        let envelope = decode(&message)?;
        let SagaCommand::FailPayment { order_id, reason } = &envelope.command else {
            return Err(unexpected(self.name(), &envelope.command));
        };
        let order_id = *order_id;

        scope
            .log(SUBJECT_PAYMENT, &["[TRANS (compensating) - Fail payment]"])
            .await;

        let payment = match scope.payments.mark_failed(order_id).await {
            Ok(payment) => payment,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "could not fail payment");
                scope
                    .log(SUBJECT_PAYMENT, &[&format!("[EXCEPTION] {e}")])
                    .await;
                return Err(e.into());
            }
        };
        scope.payments.request_refund(payment.id).await?;

        tracing::info!(
            %order_id,
            payment_id = %payment.id,
            reason = %reason,
            "payment failed, refund requested"
        );
        scope
            .log(SUBJECT_PAYMENT, &["[EVENT - Refund requested]"])
            .await;
        Ok(())
    }
}
