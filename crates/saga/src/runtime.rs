//! Wires the orchestrator and the step invokers onto the bus.

use std::sync::Arc;
use std::time::Duration;

use message_bus::{
    CommitMode, ConsumerRuntime, DEFAULT_REDELIVERY_DELAY, MessageHandler, SubscriptionSpec,
};

use crate::orchestrator::OrchestratorHandler;
use crate::retry::RetryPolicy;
use crate::scope::{SagaScope, SagaScopeFactory, SagaServices};
use crate::steps::{
    LedgerDebitHandler, LedgerReverseHandler, OrderFailHandler, OrderSuccessHandler,
    PaymentChargeHandler, PaymentFailHandler,
};
use crate::topics;

/// Client id used to name consumer groups when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "checkout";

/// Settings for [`SagaRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaSettings {
    /// Prefix of every consumer group name.
    pub client_id: String,
    pub retry: RetryPolicy,
    /// First pause before a failed manual-commit message is redelivered.
    pub redelivery_delay: Duration,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            retry: RetryPolicy::default(),
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
        }
    }
}

/// The running checkout saga: one consumer context per topic.
pub struct SagaRuntime {
    consumers: ConsumerRuntime,
}

impl SagaRuntime {
    /// Starts the orchestrator and every step invoker.
    ///
    /// The orchestrator and the completion commit run with manual commit;
    /// every other invoker commits on delivery.
    pub fn start(services: SagaServices, settings: SagaSettings) -> Self {
        let factory = Arc::new(SagaScopeFactory::new(services.clone(), settings.retry));
        let mut consumers = ConsumerRuntime::new(Arc::clone(&services.bus));
        let context = Context {
            factory: &factory,
            client_id: settings.client_id.as_str(),
            redelivery_delay: settings.redelivery_delay,
        };

        spawn(
            &mut consumers,
            &context,
            topics::CHECKOUT_ORDER_TRANSACTION,
            CommitMode::Manual,
            OrchestratorHandler,
        );
        spawn(
            &mut consumers,
            &context,
            topics::CREATE_DECREASE_TRANSACTION,
            CommitMode::Auto,
            LedgerDebitHandler,
        );
        spawn(
            &mut consumers,
            &context,
            topics::REVERSE_TRANSACTION,
            CommitMode::Auto,
            LedgerReverseHandler,
        );
        spawn(
            &mut consumers,
            &context,
            topics::MAKE_PAYMENT,
            CommitMode::Auto,
            PaymentChargeHandler,
        );
        spawn(
            &mut consumers,
            &context,
            topics::FAIL_PAYMENT,
            CommitMode::Auto,
            PaymentFailHandler,
        );
        spawn(
            &mut consumers,
            &context,
            topics::MARK_ORDER_AS_FAILED,
            CommitMode::Auto,
            OrderFailHandler,
        );
        spawn(
            &mut consumers,
            &context,
            topics::MARK_ORDER_AS_SUCCESS,
            CommitMode::Manual,
            OrderSuccessHandler,
        );

        tracing::info!(
            client_id = %settings.client_id,
            contexts = consumers.context_count(),
            max_attempts = settings.retry.max_attempts,
            "saga runtime started"
        );
        Self { consumers }
    }

    /// Number of consumer contexts running.
    pub fn context_count(&self) -> usize {
        self.consumers.context_count()
    }

    /// Stops every consumer context and waits for in-flight messages.
    pub async fn shutdown(self) {
        self.consumers.shutdown().await;
    }
}

/// What every consumer context of the saga shares.
struct Context<'a> {
    factory: &'a Arc<SagaScopeFactory>,
    client_id: &'a str,
    redelivery_delay: Duration,
}

fn spawn<H>(
    consumers: &mut ConsumerRuntime,
    context: &Context<'_>,
    topic: &str,
    commit_mode: CommitMode,
    handler: H,
) where
    H: MessageHandler<SagaScope>,
{
    let spec = SubscriptionSpec::new(context.client_id, vec![topic.to_string()], commit_mode)
        .with_redelivery_delay(context.redelivery_delay);
    consumers.spawn(spec, Arc::clone(context.factory), Arc::new(handler));
}
