//! Saga progress storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::{Result, SagaError};
use crate::state::{SagaProgress, SagaStep};

/// Persists [`SagaProgress`] records.
///
/// `record` and `record_attempts` are read-modify-write operations and must
/// be atomic per order, since several consumers update one saga at once.
#[async_trait]
pub trait SagaProgressStore: Send + Sync {
    /// Stores fresh progress for a new saga. Leaves an existing record alone.
    async fn start(&self, order_id: OrderId) -> Result<SagaProgress>;

    /// Loads the progress of a saga.
    async fn load(&self, order_id: OrderId) -> Result<Option<SagaProgress>>;

    /// Records a transition, creating the record if it is missing.
    async fn record(
        &self,
        order_id: OrderId,
        trigger: &str,
        step: SagaStep,
    ) -> Result<SagaProgress>;

    /// Records how many completion attempts were made.
    async fn record_attempts(&self, order_id: OrderId, attempts: u32) -> Result<SagaProgress>;
}

/// Extension trait providing convenience queries for progress stores.
#[async_trait]
pub trait SagaProgressStoreExt: SagaProgressStore {
    /// Returns true if `trigger` was already recorded for the order.
    async fn has_processed(&self, order_id: OrderId, trigger: &str) -> Result<bool> {
        Ok(self
            .load(order_id)
            .await?
            .is_some_and(|progress| progress.has_processed(trigger)))
    }

    /// Loads the progress of a saga that must exist.
    async fn require(&self, order_id: OrderId) -> Result<SagaProgress> {
        self.load(order_id)
            .await?
            .ok_or(SagaError::ProgressNotFound(order_id))
    }

    /// Returns the current step of a saga, if it exists.
    async fn current_step(&self, order_id: OrderId) -> Result<Option<SagaStep>> {
        Ok(self.load(order_id).await?.map(|p| p.current_step))
    }
}

// Blanket implementation for all SagaProgressStore implementations
impl<T: SagaProgressStore + ?Sized> SagaProgressStoreExt for T {}

/// In-memory progress store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProgressStore {
    records: Arc<RwLock<HashMap<OrderId, SagaProgress>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sagas tracked.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SagaProgressStore for InMemoryProgressStore {
    async fn start(&self, order_id: OrderId) -> Result<SagaProgress> {
        let mut records = self.records.write().await;
        Ok(records
            .entry(order_id)
            .or_insert_with(|| SagaProgress::new(order_id))
            .clone())
    }

    async fn load(&self, order_id: OrderId) -> Result<Option<SagaProgress>> {
        Ok(self.records.read().await.get(&order_id).cloned())
    }

    async fn record(
        &self,
        order_id: OrderId,
        trigger: &str,
        step: SagaStep,
    ) -> Result<SagaProgress> {
        let mut records = self.records.write().await;
        let progress = records
            .entry(order_id)
            .or_insert_with(|| SagaProgress::new(order_id));
        progress.advance(trigger, step);
        Ok(progress.clone())
    }

    async fn record_attempts(&self, order_id: OrderId, attempts: u32) -> Result<SagaProgress> {
        let mut records = self.records.write().await;
        let progress = records
            .entry(order_id)
            .or_insert_with(|| SagaProgress::new(order_id));
        progress.record_attempts(attempts);
        Ok(progress.clone())
    }
}
