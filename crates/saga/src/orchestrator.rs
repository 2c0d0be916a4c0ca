//! The saga orchestrator: maps each incoming event to the next commands.

use std::sync::Arc;

use async_trait::async_trait;
use domain::DEFAULT_ACCOUNT;
use message_bus::{Acknowledger, Message, MessageHandler};

use crate::activity::SUBJECT_ORCHESTRATOR;
use crate::commands::{CommandEnvelope, SagaCommand};
use crate::compensation;
use crate::envelope::{SagaEnvelope, SagaEvent};
use crate::error::{Result, SagaError};
use crate::progress::SagaProgressStoreExt;
use crate::publish::publish_command;
use crate::scope::SagaScope;
use crate::state::SagaStep;

/// The dispatch table of the checkout saga.
///
/// Stateless: the next commands depend only on the event that arrived.
pub struct Orchestrator;

impl Orchestrator {
    /// Returns the commands to issue for an event, in order.
    pub fn dispatch(envelope: &SagaEnvelope) -> Vec<SagaCommand> {
        if let Some((origin, reason)) = envelope.event.failure() {
            return compensation::chain_for(origin, envelope.order_id, reason);
        }

        match &envelope.event {
            SagaEvent::NewOrder(data) => vec![SagaCommand::CreateDecreaseTransaction {
                order: data.order.clone(),
                account_name: DEFAULT_ACCOUNT.to_string(),
            }],
            SagaEvent::NewOrderTransaction(data) => vec![SagaCommand::MakePayment {
                order_id: data.order.id,
                transaction_id: data.transaction.id,
                amount: data.transaction.amount,
            }],
            SagaEvent::OrderSuccessPayment(data) => vec![SagaCommand::MarkOrderAsSuccess {
                order_id: data.order_id,
            }],
            SagaEvent::OrderAccountFailure(_)
            | SagaEvent::OrderPaymentFailure(_)
            | SagaEvent::OrderCompletionFailure(_) => Vec::new(),
        }
    }

    /// Returns the step a saga is in once the event has been dispatched.
    pub fn next_step(event: &SagaEvent) -> SagaStep {
        if let Some((origin, _)) = event.failure() {
            return SagaStep::Compensating { origin };
        }
        match event {
            SagaEvent::NewOrder(_) => SagaStep::AwaitingDebit,
            SagaEvent::NewOrderTransaction(_) => SagaStep::AwaitingCharge,
            _ => SagaStep::AwaitingCompletion,
        }
    }
}

/// Consumes the saga topic and publishes the commands [`Orchestrator`] maps
/// each event to.
///
/// Runs on a manual-commit subscription: the event is only acknowledged
/// once every command is published and progress is recorded.
pub struct OrchestratorHandler;

#[async_trait]
impl MessageHandler<SagaScope> for OrchestratorHandler {
    type Error = SagaError;

    fn name(&self) -> &str {
        "orchestrator"
    }

    #[tracing::instrument(skip_all, fields(scope = scope.id))]
    async fn handle(
        &self,
        message: Message,
        ack: Arc<dyn Acknowledger>,
        scope: SagaScope,
    ) -> Result<()> {
        let envelope = match SagaEnvelope::from_message(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    payload = message.payload_str().unwrap_or("<binary>"),
                    "undecodable saga event"
                );
                // Undecodable; redelivering it would only fail again.
                ack.commit(&message).await?;
                return Err(e.into());
            }
        };
        let order_id = envelope.order_id;
        let kind = envelope.kind();
        metrics::counter!("saga_events_dispatched_total", "kind" => kind).increment(1);

        if scope.progress.has_processed(order_id, kind).await? {
            tracing::info!(%order_id, kind, "event already dispatched, skipping redelivery");
            ack.commit(&message).await?;
            return Ok(());
        }

        if let Some((origin, reason)) = envelope.event.failure() {
            metrics::counter!("saga_compensations_total", "origin" => origin.as_str())
                .increment(1);
            tracing::warn!(%order_id, %origin, reason, "compensation started");
            scope
                .log(
                    SUBJECT_ORCHESTRATOR,
                    &[&format!("[COMPENSATE - {origin}] {reason}")],
                )
                .await;
        }

        let commands = Orchestrator::dispatch(&envelope);
        tracing::info!(%order_id, kind, commands = commands.len(), "event dispatched");
        for command in commands {
            let command = CommandEnvelope::new(command, envelope.toggles);
            publish_command(&*scope.bus, &command).await?;
        }

        scope
            .progress
            .record(order_id, kind, Orchestrator::next_step(&envelope.event))
            .await?;
        ack.commit(&message).await?;
        Ok(())
    }
}
