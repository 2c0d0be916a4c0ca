//! Order domain: the checkout record and its terminal resolution.

mod service;

pub use service::{InMemoryOrders, OrderService};

use chrono::{DateTime, Utc};
use common::OrderId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order.
///
/// State transitions:
/// ```text
/// Processing ──┬──► Successful
///              └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// The saga is still running.
    #[default]
    Processing,

    /// Every step committed (terminal state).
    Successful,

    /// The saga compensated (terminal state).
    Failed,
}

impl OrderStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Successful | OrderStatus::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::Successful => "Successful",
            OrderStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A checkout order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub amount: Decimal,
    pub status: OrderStatus,
    /// Human-readable reason, set when the order fails.
    pub failure_details: Option<String>,
    pub creation_time: DateTime<Utc>,
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Orders must be for a positive amount.
    #[error("Invalid order amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
}

impl OrderError {
    pub fn is_validation(&self) -> bool {
        matches!(self, OrderError::InvalidAmount(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrderError::OrderNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Successful.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_as_name() {
        let json = serde_json::to_string(&OrderStatus::Successful).unwrap();
        assert_eq!(json, r#""Successful""#);
        assert_eq!(OrderStatus::Failed.to_string(), "Failed");
    }
}
