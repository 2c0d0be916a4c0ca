use std::sync::Arc;

use async_trait::async_trait;
use domain::OrderStatus;
use message_bus::{Acknowledger, Message, MessageHandler};

use super::{decode, emit, unexpected};
use crate::activity::SUBJECT_ORDER;
use crate::commands::{CommandKind, SagaCommand};
use crate::envelope::SagaEvent;
use crate::error::{Result, SagaError};
use crate::retry::RetryOutcome;
use crate::scope::SagaScope;
use crate::state::SagaStep;

/// Reason carried by the failure event when the completion commit runs out
/// of attempts.
pub const COMPLETION_FAILURE_REASON: &str = "Complete order failed";

/// Resolves an order as failed. The last step of every compensation chain.
pub struct OrderFailHandler;

#[async_trait]
impl MessageHandler<SagaScope> for OrderFailHandler {
    type Error = SagaError;

    fn name(&self) -> &str {
        "order-fail"
    }

    #[tracing::instrument(skip_all, fields(scope = scope.id))]
    async fn handle(
        &self,
        message: Message,
        _ack: Arc<dyn Acknowledger>,
        scope: SagaScope,
    ) -> Result<()> {
        let envelope = decode(&message)?;
        let SagaCommand::MarkOrderAsFailed { order_id, reason } = &envelope.command else {
            return Err(unexpected(self.name(), &envelope.command));
        };
        let order_id = *order_id;

        scope
            .log(
                SUBJECT_ORDER,
                &["[TRANS (compensating) - Mark order as failed]"],
            )
            .await;

        let order = scope.orders.mark_failed(order_id, reason).await?;
        scope
            .progress
            .record(
                order_id,
                CommandKind::MarkOrderAsFailed.as_str(),
                SagaStep::Failed,
            )
            .await?;

        metrics::counter!("saga_orders_failed_total").increment(1);
        tracing::info!(%order_id, status = %order.status, reason = %reason, "order failed");
        scope
            .log(
                SUBJECT_ORDER,
                &[&format!("[EVENT - Order failed] {reason}")],
            )
            .await;
        Ok(())
    }
}

/// Commits a paid order as successful, retrying within the policy bounds.
///
/// Runs on a manual-commit subscription: the command is acknowledged only
/// after either the order is committed or the failure event is published.
pub struct OrderSuccessHandler;

#[async_trait]
impl MessageHandler<SagaScope> for OrderSuccessHandler {
    type Error = SagaError;

    fn name(&self) -> &str {
        "order-success"
    }

    #[tracing::instrument(skip_all, fields(scope = scope.id))]
    async fn handle(
        &self,
        message: Message,
        ack: Arc<dyn Acknowledger>,
        scope: SagaScope,
    ) -> Result<()> {
        let envelope = match decode(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                ack.commit(&message).await?;
                return Err(e);
            }
        };
        let toggles = envelope.toggles;
        let SagaCommand::MarkOrderAsSuccess { order_id } = &envelope.command else {
            ack.commit(&message).await?;
            return Err(unexpected(self.name(), &envelope.command));
        };
        let order_id = *order_id;

        scope
            .log(
                SUBJECT_ORDER,
                &["[TRANS (retryable) - Mark order as success]"],
            )
            .await;

        // A redelivered command picks up where the last delivery stopped.
        let previous = scope
            .progress
            .load(order_id)
            .await?
            .map_or(0, |progress| progress.attempts);

        let progress = Arc::clone(&scope.progress);
        let record = move |attempt| {
            let progress = Arc::clone(&progress);
            async move {
                if let Err(e) = progress.record_attempts(order_id, attempt).await {
                    tracing::warn!(
                        %order_id,
                        attempt,
                        error = %e,
                        "could not record completion attempt"
                    );
                }
            }
        };
        let orders = Arc::clone(&scope.orders);
        let outcome = scope
            .retry
            .run_completion(&toggles, previous, record, move |_| {
                let orders = Arc::clone(&orders);
                async move { orders.mark_success(order_id).await }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                if value.status == OrderStatus::Successful {
                    scope
                        .progress
                        .record(
                            order_id,
                            CommandKind::MarkOrderAsSuccess.as_str(),
                            SagaStep::Completed,
                        )
                        .await?;
                    metrics::counter!("saga_orders_completed_total").increment(1);
                    tracing::info!(%order_id, attempts, "order completed");
                    scope
                        .log(SUBJECT_ORDER, &["[EVENT - Order completed]"])
                        .await;
                } else {
                    tracing::warn!(
                        %order_id,
                        status = %value.status,
                        "order already resolved, completion ignored"
                    );
                }
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    %order_id,
                    attempts,
                    last_error = ?last_error,
                    "completion attempts exhausted"
                );
                scope
                    .log(
                        SUBJECT_ORDER,
                        &[&format!(
                            "[EXCEPTION] {COMPLETION_FAILURE_REASON} after {attempts} attempts"
                        )],
                    )
                    .await;
                emit(
                    &scope,
                    SagaEvent::order_completion_failure(order_id, COMPLETION_FAILURE_REASON),
                    toggles,
                )
                .await?;
            }
        }

        ack.commit(&message).await?;
        Ok(())
    }
}
