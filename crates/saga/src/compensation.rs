//! Compensation chains.
//!
//! Each failure origin maps to a fixed, ordered list of undo commands. The
//! order matters: later commands assume the effects of earlier ones, so a
//! payment is failed before its debit is reversed, and the order is only
//! marked failed once everything else has been asked to undo.

use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::commands::SagaCommand;

/// Which forward step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureOrigin {
    /// The ledger debit failed; nothing was moved.
    LedgerDebit,

    /// The payment charge failed after the debit went through.
    PaymentCharge,

    /// The completion commit ran out of attempts after payment.
    CompletionCommit,
}

impl FailureOrigin {
    /// Returns the origin name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureOrigin::LedgerDebit => "LedgerDebit",
            FailureOrigin::PaymentCharge => "PaymentCharge",
            FailureOrigin::CompletionCommit => "CompletionCommit",
        }
    }
}

impl std::fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns the undo commands for a failure, in the order they must be issued.
pub fn chain_for(origin: FailureOrigin, order_id: OrderId, reason: &str) -> Vec<SagaCommand> {
    let mark_failed = SagaCommand::MarkOrderAsFailed {
        order_id,
        reason: reason.to_string(),
    };
    let reverse = SagaCommand::ReverseTransaction {
        order_id,
        reason: reason.to_string(),
    };

    match origin {
        FailureOrigin::LedgerDebit => vec![mark_failed],
        FailureOrigin::PaymentCharge => vec![reverse, mark_failed],
        FailureOrigin::CompletionCommit => vec![
            SagaCommand::FailPayment {
                order_id,
                reason: reason.to_string(),
            },
            reverse,
            mark_failed,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandKind;

    fn kinds(origin: FailureOrigin) -> Vec<CommandKind> {
        chain_for(origin, OrderId::new(), "boom")
            .iter()
            .map(SagaCommand::kind)
            .collect()
    }

    #[test]
    fn test_ledger_failure_only_marks_order() {
        assert_eq!(
            kinds(FailureOrigin::LedgerDebit),
            vec![CommandKind::MarkOrderAsFailed]
        );
    }

    #[test]
    fn test_payment_failure_reverses_then_marks() {
        assert_eq!(
            kinds(FailureOrigin::PaymentCharge),
            vec![CommandKind::ReverseTransaction, CommandKind::MarkOrderAsFailed]
        );
    }

    #[test]
    fn test_completion_failure_runs_full_chain() {
        assert_eq!(
            kinds(FailureOrigin::CompletionCommit),
            vec![
                CommandKind::FailPayment,
                CommandKind::ReverseTransaction,
                CommandKind::MarkOrderAsFailed
            ]
        );
    }

    #[test]
    fn test_chain_carries_reason_and_order() {
        let order_id = OrderId::new();
        for command in chain_for(
            FailureOrigin::CompletionCommit,
            order_id,
            "Complete order failed",
        ) {
            assert_eq!(command.order_id(), order_id);
        }
        assert_eq!(
            chain_for(FailureOrigin::LedgerDebit, order_id, "Not enough balance"),
            vec![SagaCommand::MarkOrderAsFailed {
                order_id,
                reason: "Not enough balance".to_string()
            }]
        );
    }
}
