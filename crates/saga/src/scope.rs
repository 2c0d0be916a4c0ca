//! Per-message dependency scopes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::{
    InMemoryLedger, InMemoryOrders, InMemoryPayments, LedgerService, OrderService, PaymentService,
};
use message_bus::{InMemoryBus, ScopeFactory, SharedBus};

use crate::activity::{ActivitySink, InMemoryActivityLog};
use crate::progress::{InMemoryProgressStore, SagaProgressStore};
use crate::retry::RetryPolicy;

/// Process-wide handles the saga is wired from.
#[derive(Clone)]
pub struct SagaServices {
    pub bus: SharedBus,
    pub ledger: Arc<dyn LedgerService>,
    pub payments: Arc<dyn PaymentService>,
    pub orders: Arc<dyn OrderService>,
    pub progress: Arc<dyn SagaProgressStore>,
    pub activity: Arc<dyn ActivitySink>,
}

impl SagaServices {
    /// Wires the domain services in memory around the given bus.
    pub fn new(bus: SharedBus) -> Self {
        Self {
            bus,
            ledger: Arc::new(InMemoryLedger::new()),
            payments: Arc::new(InMemoryPayments::new()),
            orders: Arc::new(InMemoryOrders::new()),
            progress: Arc::new(InMemoryProgressStore::new()),
            activity: Arc::new(InMemoryActivityLog::new()),
        }
    }

    /// Wires every service, the bus included, in memory.
    pub fn in_memory(bus: InMemoryBus) -> Self {
        Self::new(Arc::new(bus))
    }

    /// Replaces the progress store.
    pub fn with_progress(mut self, progress: Arc<dyn SagaProgressStore>) -> Self {
        self.progress = progress;
        self
    }
}

/// Dependencies handed to one message handler invocation.
///
/// Every message gets its own scope, so no handler ever holds on to state
/// from a previous message.
#[derive(Clone)]
pub struct SagaScope {
    /// Sequence number of the scope, for tracing.
    pub id: u64,
    pub bus: SharedBus,
    pub ledger: Arc<dyn LedgerService>,
    pub payments: Arc<dyn PaymentService>,
    pub orders: Arc<dyn OrderService>,
    pub progress: Arc<dyn SagaProgressStore>,
    pub activity: Arc<dyn ActivitySink>,
    pub retry: RetryPolicy,
}

impl SagaScope {
    /// Pushes activity lines under `subject`.
    pub async fn log(&self, subject: &str, lines: &[&str]) {
        let messages: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
        self.activity.push(subject, &messages).await;
    }
}

/// Builds a fresh [`SagaScope`] per message.
pub struct SagaScopeFactory {
    services: SagaServices,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl SagaScopeFactory {
    pub fn new(services: SagaServices, retry: RetryPolicy) -> Self {
        Self {
            services,
            retry,
            next_id: AtomicU64::new(1),
        }
    }
}

impl ScopeFactory for SagaScopeFactory {
    type Scope = SagaScope;

    fn create_scope(&self) -> Self::Scope {
        let services = self.services.clone();
        SagaScope {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            bus: services.bus,
            ledger: services.ledger,
            payments: services.payments,
            orders: services.orders,
            progress: services.progress,
            activity: services.activity,
            retry: self.retry,
        }
    }
}
