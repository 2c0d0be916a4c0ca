//! Supervised consumer contexts.
//!
//! Each [`SubscriptionSpec`] handed to a [`ConsumerRuntime`] gets its own
//! long-running task that joins the consumer group, pulls messages, and runs
//! the handler once per message inside a fresh dependency scope. A failing or
//! panicking handler is logged. On a manual-commit subscription a message the
//! handler neither finished nor committed is rewound and delivered again
//! after a backoff; on an auto-commit subscription the loop moves on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{Acknowledger, BusError, CommitMode, Message, SharedBus, Subscription};

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// First pause before an unsettled message is delivered again.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_millis(200);

/// Upper bound for the redelivery backoff.
const MAX_REDELIVERY_DELAY: Duration = Duration::from_secs(10);

/// What a consumer context subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub topics: Vec<String>,
    pub group: String,
    pub commit_mode: CommitMode,
    /// First backoff before redelivering a failed manual-commit message.
    /// Doubles with every consecutive failure.
    pub redelivery_delay: Duration,
}

impl SubscriptionSpec {
    /// Builds a spec whose group is derived from the client id and topics.
    pub fn new(client_id: &str, topics: Vec<String>, commit_mode: CommitMode) -> Self {
        let group = group_name(client_id, &topics);
        Self {
            topics,
            group,
            commit_mode,
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
        }
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }
}

/// Consumer group name for a client reading the given topics.
///
/// Two contexts with the same client id and topic list share a group and
/// therefore split the partitions between them.
pub fn group_name(client_id: &str, topics: &[String]) -> String {
    format!("{client_id}_{}", topics.join("_"))
}

/// Creates the per-message dependency scope handed to a handler.
pub trait ScopeFactory: Send + Sync + 'static {
    type Scope: Send + 'static;

    fn create_scope(&self) -> Self::Scope;
}

/// Processes messages delivered to a consumer context.
#[async_trait]
pub trait MessageHandler<S>: Send + Sync + 'static {
    type Error: std::fmt::Display + Send + 'static;

    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Handles one message.
    ///
    /// Handlers on manual-commit subscriptions are responsible for
    /// committing through `ack` once they reach a terminal outcome. If they
    /// return an error or panic without committing, the message is delivered
    /// again.
    async fn handle(
        &self,
        message: Message,
        ack: Arc<dyn Acknowledger>,
        scope: S,
    ) -> std::result::Result<(), Self::Error>;
}

/// Owns the consumer contexts of a process and stops them together.
pub struct ConsumerRuntime {
    bus: SharedBus,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerRuntime {
    pub fn new(bus: SharedBus) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            bus,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Starts a consumer context for `spec`.
    pub fn spawn<F, H>(&mut self, spec: SubscriptionSpec, factory: Arc<F>, handler: Arc<H>)
    where
        F: ScopeFactory,
        H: MessageHandler<F::Scope>,
    {
        let bus = Arc::clone(&self.bus);
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_context(bus, spec, factory, handler, shutdown));
        self.handles.push(handle);
    }

    /// Number of contexts started so far.
    pub fn context_count(&self) -> usize {
        self.handles.len()
    }

    /// Signals every context to stop and waits for them to finish.
    ///
    /// A message already being handled is allowed to complete.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "consumer context ended abnormally");
            }
        }
        tracing::info!("consumer runtime stopped");
    }
}

async fn run_context<F, H>(
    bus: SharedBus,
    spec: SubscriptionSpec,
    factory: Arc<F>,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) where
    F: ScopeFactory,
    H: MessageHandler<F::Scope>,
{
    if let Err(e) = bus.ensure_topics_exist(&spec.topics).await {
        tracing::warn!(group = %spec.group, error = %e, "could not ensure topics exist");
    }

    let mut subscription = match bus
        .subscribe(&spec.topics, &spec.group, spec.commit_mode)
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!(group = %spec.group, error = %e, "consumer failed to subscribe");
            return;
        }
    };
    let ack = subscription.acknowledger();
    let mut failures: u32 = 0;

    tracing::info!(
        handler = handler.name(),
        group = %spec.group,
        topics = ?spec.topics,
        mode = %spec.commit_mode,
        "consumer started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            polled = subscription.poll() => match polled {
                Ok(message) => {
                    let settled =
                        dispatch(&*factory, &handler, Arc::clone(&ack), message.clone()).await;
                    if settled || spec.commit_mode == CommitMode::Auto {
                        failures = 0;
                        continue;
                    }

                    failures = failures.saturating_add(1);
                    let delay = backoff(spec.redelivery_delay, failures);
                    redeliver(&mut *subscription, &message, &spec.group, delay).await;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(BusError::Closed) => break,
                Err(e) => {
                    tracing::warn!(group = %spec.group, error = %e, "poll failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    tracing::info!(handler = handler.name(), group = %spec.group, "consumer stopped");
}

/// Doubles `base` per consecutive failure, capped at [`MAX_REDELIVERY_DELAY`].
fn backoff(base: Duration, failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(10);
    base.saturating_mul(factor).min(MAX_REDELIVERY_DELAY)
}

/// Rewinds the subscription so `message` is polled again.
async fn redeliver(
    subscription: &mut dyn Subscription,
    message: &Message,
    group: &str,
    delay: Duration,
) {
    match subscription.rewind(message).await {
        Ok(()) => tracing::warn!(
            group,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            delay_ms = delay.as_millis() as u64,
            "message not settled, redelivering"
        ),
        Err(e) => tracing::error!(
            group,
            topic = %message.topic,
            offset = message.offset,
            error = %e,
            "could not rewind subscription"
        ),
    }
}

/// Remembers whether the handler committed through its acknowledger.
struct TrackedAck {
    inner: Arc<dyn Acknowledger>,
    committed: AtomicBool,
}

#[async_trait]
impl Acknowledger for TrackedAck {
    async fn commit(&self, message: &Message) -> crate::Result<()> {
        self.inner.commit(message).await?;
        self.committed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Runs the handler for one message in its own task so a panic stays
/// contained to that message.
///
/// Returns true once the message is settled: the handler either succeeded
/// or committed before failing.
async fn dispatch<F, H>(
    factory: &F,
    handler: &Arc<H>,
    ack: Arc<dyn Acknowledger>,
    message: Message,
) -> bool
where
    F: ScopeFactory,
    H: MessageHandler<F::Scope>,
{
    let span = tracing::info_span!(
        "consume",
        handler = handler.name(),
        topic = %message.topic,
        partition = message.partition,
        offset = message.offset,
        key = %message.key,
    );

    let tracked = Arc::new(TrackedAck {
        inner: ack,
        committed: AtomicBool::new(false),
    });
    let task_ack: Arc<dyn Acknowledger> = Arc::clone(&tracked) as Arc<dyn Acknowledger>;
    let scope = factory.create_scope();
    let task_handler = Arc::clone(handler);
    let outcome = tokio::spawn(
        async move { task_handler.handle(message, task_ack, scope).await }
            .instrument(span.clone()),
    )
    .await;

    let _entered = span.enter();
    match outcome {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => {
            metrics::counter!(
                "consumer_handler_failures_total",
                "handler" => handler.name().to_string(),
                "kind" => "error"
            )
            .increment(1);
            tracing::error!(error = %e, "message handler failed");
        }
        Err(e) => {
            metrics::counter!(
                "consumer_handler_failures_total",
                "handler" => handler.name().to_string(),
                "kind" => "panic"
            )
            .increment(1);
            tracing::error!(error = %e, "message handler panicked");
        }
    }
    tracked.committed.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_name_joins_topics() {
        let topics = vec!["A".to_string(), "B".to_string()];
        assert_eq!(group_name("checkout", &topics), "checkout_A_B");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 1), Duration::from_millis(100));
        assert_eq!(backoff(base, 2), Duration::from_millis(200));
        assert_eq!(backoff(base, 4), Duration::from_millis(800));
        assert_eq!(backoff(base, 50), MAX_REDELIVERY_DELAY);
    }

    #[test]
    fn test_spec_derives_group() {
        let spec = SubscriptionSpec::new(
            "checkout",
            vec!["CheckoutOrderTransaction".to_string()],
            CommitMode::Manual,
        );
        assert_eq!(spec.group, "checkout_CheckoutOrderTransaction");
        assert_eq!(spec.commit_mode, CommitMode::Manual);
    }
}
