//! Commands the orchestrator issues to the domain step invokers.

use common::{FaultToggles, OrderId, TransactionId};
use domain::Order;
use message_bus::Message;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::topics;

/// The kinds of command, one per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    CreateDecreaseTransaction,
    MakePayment,
    MarkOrderAsSuccess,
    MarkOrderAsFailed,
    ReverseTransaction,
    FailPayment,
}

impl CommandKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::CreateDecreaseTransaction => "CreateDecreaseTransaction",
            CommandKind::MakePayment => "MakePayment",
            CommandKind::MarkOrderAsSuccess => "MarkOrderAsSuccess",
            CommandKind::MarkOrderAsFailed => "MarkOrderAsFailed",
            CommandKind::ReverseTransaction => "ReverseTransaction",
            CommandKind::FailPayment => "FailPayment",
        }
    }

    /// Returns the topic commands of this kind are published on.
    pub fn topic(&self) -> &'static str {
        match self {
            CommandKind::CreateDecreaseTransaction => topics::CREATE_DECREASE_TRANSACTION,
            CommandKind::MakePayment => topics::MAKE_PAYMENT,
            CommandKind::MarkOrderAsSuccess => topics::MARK_ORDER_AS_SUCCESS,
            CommandKind::MarkOrderAsFailed => topics::MARK_ORDER_AS_FAILED,
            CommandKind::ReverseTransaction => topics::REVERSE_TRANSACTION,
            CommandKind::FailPayment => topics::FAIL_PAYMENT,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A step the orchestrator asks one domain to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum SagaCommand {
    /// Debit the account for a new order.
    CreateDecreaseTransaction { order: Order, account_name: String },

    /// Charge the payment for a debited order. `amount` is the debit amount.
    MakePayment {
        order_id: OrderId,
        transaction_id: TransactionId,
        amount: Decimal,
    },

    /// Commit the order as successful.
    MarkOrderAsSuccess { order_id: OrderId },

    /// Resolve the order as failed.
    MarkOrderAsFailed { order_id: OrderId, reason: String },

    /// Credit back the order's debit.
    ReverseTransaction { order_id: OrderId, reason: String },

    /// Mark the order's payment failed and request a refund.
    FailPayment { order_id: OrderId, reason: String },
}

impl SagaCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            SagaCommand::CreateDecreaseTransaction { .. } => CommandKind::CreateDecreaseTransaction,
            SagaCommand::MakePayment { .. } => CommandKind::MakePayment,
            SagaCommand::MarkOrderAsSuccess { .. } => CommandKind::MarkOrderAsSuccess,
            SagaCommand::MarkOrderAsFailed { .. } => CommandKind::MarkOrderAsFailed,
            SagaCommand::ReverseTransaction { .. } => CommandKind::ReverseTransaction,
            SagaCommand::FailPayment { .. } => CommandKind::FailPayment,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            SagaCommand::CreateDecreaseTransaction { order, .. } => order.id,
            SagaCommand::MakePayment { order_id, .. }
            | SagaCommand::MarkOrderAsSuccess { order_id }
            | SagaCommand::MarkOrderAsFailed { order_id, .. }
            | SagaCommand::ReverseTransaction { order_id, .. }
            | SagaCommand::FailPayment { order_id, .. } => *order_id,
        }
    }

    /// Returns the topic this command is published on.
    pub fn topic(&self) -> &'static str {
        self.kind().topic()
    }

    /// Stable key identifying this command for its order.
    ///
    /// Redelivered copies carry the same key, which lets step invokers
    /// recognise work they already did.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.order_id(), self.kind())
    }
}

/// A command as it travels on its topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub idempotency_key: String,
    #[serde(default)]
    pub toggles: FaultToggles,
    pub command: SagaCommand,
}

impl CommandEnvelope {
    pub fn new(command: SagaCommand, toggles: FaultToggles) -> Self {
        Self {
            idempotency_key: command.idempotency_key(),
            toggles,
            command,
        }
    }

    /// Decodes a command envelope from a bus message.
    pub fn from_message(message: &Message) -> message_bus::Result<Self> {
        message.decode()
    }

    pub fn order_id(&self) -> OrderId {
        self.command.order_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_is_order_and_kind() {
        let order_id = OrderId::new();
        let command = SagaCommand::MarkOrderAsSuccess { order_id };
        assert_eq!(
            command.idempotency_key(),
            format!("{order_id}:MarkOrderAsSuccess")
        );
        assert_eq!(
            CommandEnvelope::new(command.clone(), FaultToggles::default()).idempotency_key,
            command.idempotency_key()
        );
    }

    #[test]
    fn test_every_kind_has_its_own_topic() {
        let kinds = [
            CommandKind::CreateDecreaseTransaction,
            CommandKind::MakePayment,
            CommandKind::MarkOrderAsSuccess,
            CommandKind::MarkOrderAsFailed,
            CommandKind::ReverseTransaction,
            CommandKind::FailPayment,
        ];
        let mut topics: Vec<&str> = kinds.iter().map(|k| k.topic()).collect();
        topics.sort();
        topics.dedup();
        assert_eq!(topics.len(), kinds.len());
        assert!(topics.iter().all(|t| t.ends_with("Command")));
    }

    #[test]
    fn test_command_wire_shape() {
        let order_id = OrderId::new();
        let envelope = CommandEnvelope::new(
            SagaCommand::ReverseTransaction {
                order_id,
                reason: "declined".to_string(),
            },
            FaultToggles::default(),
        );

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["command"]["kind"], "ReverseTransaction");
        assert_eq!(json["command"]["payload"]["reason"], "declined");
    }
}
