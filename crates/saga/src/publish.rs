//! Publishing saga events and commands onto the bus.

use message_bus::{MessageBus, MessageBusExt};

use crate::Result;
use crate::commands::CommandEnvelope;
use crate::envelope::SagaEnvelope;
use crate::topics;

/// Publishes an event envelope on the shared saga topic, keyed by order.
pub async fn publish_event(bus: &dyn MessageBus, envelope: &SagaEnvelope) -> Result<()> {
    let key = envelope.order_id.to_string();
    bus.publish_json(topics::CHECKOUT_ORDER_TRANSACTION, &key, envelope)
        .await?;
    tracing::debug!(order_id = %envelope.order_id, kind = envelope.kind(), "saga event published");
    Ok(())
}

/// Publishes a command on its own topic, keyed by order.
pub async fn publish_command(bus: &dyn MessageBus, envelope: &CommandEnvelope) -> Result<()> {
    let kind = envelope.command.kind();
    let key = envelope.order_id().to_string();
    bus.publish_json(kind.topic(), &key, envelope).await?;

    metrics::counter!("saga_commands_published_total", "command" => kind.as_str()).increment(1);
    tracing::debug!(order_id = %key, command = %kind, "saga command published");
    Ok(())
}
