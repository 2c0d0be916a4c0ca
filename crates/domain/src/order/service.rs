//! Order service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{Order, OrderError, OrderStatus};

/// Trait for order lifecycle operations.
///
/// An order resolves exactly once: marking an order that is already
/// terminal returns it unchanged.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Creates a new order in `Processing`.
    async fn create(&self, amount: Decimal) -> Result<Order, OrderError>;

    /// Resolves an order as failed with a reason.
    async fn mark_failed(&self, order_id: OrderId, reason: &str) -> Result<Order, OrderError>;

    /// Resolves an order as successful.
    async fn mark_success(&self, order_id: OrderId) -> Result<Order, OrderError>;

    /// Returns an order by id.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderError>;

    /// Returns every order, newest first.
    async fn list(&self) -> Result<Vec<Order>, OrderError>;
}

/// In-memory order store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrders {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolve(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Order, OrderError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if order.status.is_terminal() {
            tracing::debug!(
                %order_id,
                current = %order.status,
                requested = %status,
                "order already resolved"
            );
            return Ok(order.clone());
        }

        order.status = status;
        order.failure_details = reason.map(str::to_string);
        tracing::info!(%order_id, %status, "order resolved");
        Ok(order.clone())
    }
}

#[async_trait]
impl OrderService for InMemoryOrders {
    #[tracing::instrument(skip(self))]
    async fn create(&self, amount: Decimal) -> Result<Order, OrderError> {
        if amount <= Decimal::ZERO {
            return Err(OrderError::InvalidAmount(amount));
        }

        let order = Order {
            id: OrderId::new(),
            amount,
            status: OrderStatus::Processing,
            failure_details: None,
            creation_time: Utc::now(),
        };
        self.orders.write().await.insert(order.id, order.clone());

        tracing::info!(order_id = %order.id, "order created");
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_failed(&self, order_id: OrderId, reason: &str) -> Result<Order, OrderError> {
        self.resolve(order_id, OrderStatus::Failed, Some(reason))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn mark_success(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.resolve(order_id, OrderStatus::Successful, None).await
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>, OrderError> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_create_order() {
        let orders = InMemoryOrders::new();

        let order = orders.create(dec!(100)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.amount, dec!(100));
        assert!(order.failure_details.is_none());
        assert_eq!(orders.get(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_create_rejects_non_positive_amount() {
        let orders = InMemoryOrders::new();

        assert!(matches!(
            orders.create(dec!(0)).await,
            Err(OrderError::InvalidAmount(_))
        ));
        assert!(matches!(
            orders.create(dec!(-1)).await,
            Err(OrderError::InvalidAmount(_))
        ));
        assert!(orders.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failed_sets_details() {
        let orders = InMemoryOrders::new();
        let order = orders.create(dec!(10)).await.unwrap();

        let failed = orders
            .mark_failed(order.id, "Not enough balance")
            .await
            .unwrap();
        assert_eq!(failed.status, OrderStatus::Failed);
        assert_eq!(
            failed.failure_details.as_deref(),
            Some("Not enough balance")
        );
    }

    #[tokio::test]
    async fn test_terminal_order_is_not_changed_again() {
        let orders = InMemoryOrders::new();
        let order = orders.create(dec!(10)).await.unwrap();

        orders.mark_success(order.id).await.unwrap();
        let after = orders.mark_failed(order.id, "late failure").await.unwrap();

        assert_eq!(after.status, OrderStatus::Successful);
        assert!(after.failure_details.is_none());
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let orders = InMemoryOrders::new();
        let missing = OrderId::new();

        assert!(matches!(
            orders.mark_success(missing).await,
            Err(OrderError::OrderNotFound(_))
        ));
        assert!(matches!(
            orders.mark_failed(missing, "x").await,
            Err(OrderError::OrderNotFound(_))
        ));
        assert_eq!(orders.get(missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let orders = InMemoryOrders::new();
        let first = orders.create(dec!(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = orders.create(dec!(2)).await.unwrap();

        let listed: Vec<OrderId> = orders.list().await.unwrap().iter().map(|o| o.id).collect();
        assert_eq!(listed, vec![second.id, first.id]);
    }
}
