//! Step invokers: one handler per command topic.
//!
//! Each invoker performs its side effect against a domain service and, for
//! the forward steps, reports the outcome back to the orchestrator as a
//! saga event. Compensation invokers report nothing; their effect is final.

mod ledger;
mod order;
mod payment;

pub use ledger::{LedgerDebitHandler, LedgerReverseHandler};
pub use order::{COMPLETION_FAILURE_REASON, OrderFailHandler, OrderSuccessHandler};
pub use payment::{PaymentChargeHandler, PaymentFailHandler};

use common::FaultToggles;
use message_bus::Message;

use crate::commands::{CommandEnvelope, SagaCommand};
use crate::envelope::{SagaEnvelope, SagaEvent};
use crate::error::{Result, SagaError};
use crate::publish::publish_event;
use crate::scope::SagaScope;

fn decode(message: &Message) -> Result<CommandEnvelope> {
    let envelope = CommandEnvelope::from_message(message)?;
    tracing::debug!(
        order_id = %envelope.order_id(),
        key = %envelope.idempotency_key,
        "command received"
    );
    Ok(envelope)
}

fn unexpected(step: &str, command: &SagaCommand) -> SagaError {
    SagaError::step_failed(step, format!("unexpected command {}", command.kind()))
}

/// Reports a step outcome to the orchestrator, carrying the toggles along.
async fn emit(scope: &SagaScope, event: SagaEvent, toggles: FaultToggles) -> Result<()> {
    publish_event(&*scope.bus, &SagaEnvelope::new(event, toggles)).await
}
