use std::sync::Arc;

use async_trait::async_trait;
use message_bus::{Acknowledger, Message, MessageHandler};

use super::{decode, emit, unexpected};
use crate::activity::SUBJECT_LEDGER;
use crate::commands::SagaCommand;
use crate::envelope::SagaEvent;
use crate::error::{Result, SagaError};
use crate::scope::SagaScope;

/// Debits the customer's account for a new order.
pub struct LedgerDebitHandler;

#[async_trait]
impl MessageHandler<SagaScope> for LedgerDebitHandler {
    type Error = SagaError;

    fn name(&self) -> &str {
        "ledger-debit"
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
        let (order, account_name) = match envelope.command {
            SagaCommand::CreateDecreaseTransaction {
                order,
                account_name,
            } => (order, account_name),
            other => return Err(unexpected(self.name(), &other)),
        };

        scope
            .log(SUBJECT_LEDGER, &["[TRANS - Create decrease transaction]"])
            .await;

        if toggles.should_ledger_debit_fail {
            let reason = "Ledger debit failed: transaction rejected by configuration";
            tracing::warn!(order_id = %order.id, "ledger debit failure injected");
            scope
                .log(SUBJECT_LEDGER, &[&format!("[EXCEPTION] {reason}")])
                .await;
            return emit(
                &scope,
                SagaEvent::order_account_failure(order.id, reason),
                toggles,
            )
            .await;
        }

        let description = format!("Checkout of order {}", order.id);
        match scope
            .ledger
            .debit(order.id, &account_name, order.amount, &description)
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    order_id = %order.id,
                    transaction_id = %receipt.transaction.id,
                    balance = %receipt.balance,
                    "account debited"
                );
                scope
                    .log(SUBJECT_LEDGER, &["[EVENT - New transaction]"])
                    .await;
                emit(
                    &scope,
                    SagaEvent::new_order_transaction(order, receipt.transaction),
                    toggles,
                )
                .await
            }
            Err(e) => {
                let reason = format!("Ledger debit failed: {e}");
                tracing::warn!(order_id = %order.id, error = %e, "account debit rejected");
                scope
                    .log(SUBJECT_LEDGER, &[&format!("[EXCEPTION] {reason}")])
                    .await;
                emit(
                    &scope,
                    SagaEvent::order_account_failure(order.id, reason),
                    toggles,
                )
                .await
            }
        }
    }
}

/// Credits back the debit of a failed order.
pub struct LedgerReverseHandler;

#[async_trait]
impl MessageHandler<SagaScope> for LedgerReverseHandler {
    type Error = SagaError;

    fn name(&self) -> &str {
        "ledger-reverse"
    }

    #[tracing::instrument(skip_all, fields(scope = scope.id))]
    async fn handle(
        &self,
        message: Message,
        _ack: Arc<dyn Acknowledger>,
        scope: SagaScope,
    ) -> Result<()> {
        let envelope = decode(&message)?;
        let SagaCommand::ReverseTransaction { order_id, reason } = &envelope.command else {
            return Err(unexpected(self.name(), &envelope.command));
        };

        scope
            .log(
                SUBJECT_LEDGER,
                &["[TRANS (compensating) - Reverse transaction]"],
            )
            .await;

        match scope
            .ledger
            .reverse(*order_id, &format!("Reversal: {reason}"))
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    %order_id,
                    transaction_id = %receipt.transaction.id,
                    balance = %receipt.balance,
                    "debit reversed"
                );
                scope
                    .log(SUBJECT_LEDGER, &["[EVENT - Transaction reversed]"])
                    .await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(%order_id, error = %e, "debit reversal failed");
                scope
                    .log(SUBJECT_LEDGER, &[&format!("[EXCEPTION] {e}")])
                    .await;
                Err(e.into())
            }
        }
    }
}
