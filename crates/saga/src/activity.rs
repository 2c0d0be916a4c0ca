//! Human-readable activity log for demo visibility.
//!
//! Step invokers push short lines such as `[TRANS - Create decrease
//! transaction]` so the progress of a checkout can be followed without a
//! log pipeline.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Default number of entries kept by [`InMemoryActivityLog`].
pub const DEFAULT_CAPACITY: usize = 1000;

/// Subject used for ledger lines.
pub const SUBJECT_LEDGER: &str = "Ledger";
/// Subject used for payment lines.
pub const SUBJECT_PAYMENT: &str = "Payment";
/// Subject used for order lines.
pub const SUBJECT_ORDER: &str = "Order";
/// Subject used for orchestrator lines.
pub const SUBJECT_ORCHESTRATOR: &str = "Orchestrator";

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub subject: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// Receives activity lines.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Appends lines under one subject.
    async fn push(&self, subject: &str, messages: &[String]);

    /// Returns the retained entries, oldest first.
    async fn entries(&self) -> Vec<ActivityEntry>;
}

/// Bounded in-memory activity log; the oldest entries are dropped first.
#[derive(Debug, Clone)]
pub struct InMemoryActivityLog {
    entries: Arc<RwLock<VecDeque<ActivityEntry>>>,
    capacity: usize,
}

impl Default for InMemoryActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Returns true if any retained line contains `needle`.
    pub async fn contains(&self, needle: &str) -> bool {
        self.entries
            .read()
            .await
            .iter()
            .any(|entry| entry.message.contains(needle))
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivityLog {
    async fn push(&self, subject: &str, messages: &[String]) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        for message in messages {
            tracing::debug!(subject, message = %message, "activity");
            entries.push_back(ActivityEntry {
                subject: subject.to_string(),
                message: message.clone(),
                recorded_at: now,
            });
        }
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    async fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_keeps_order() {
        let log = InMemoryActivityLog::new();
        log.push(
            SUBJECT_LEDGER,
            &[
                "[TRANS - Create decrease transaction]".to_string(),
                "[EVENT - New transaction]".to_string(),
            ],
        )
        .await;

        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].subject, "Ledger");
        assert_eq!(entries[1].message, "[EVENT - New transaction]");
        assert!(log.contains("New transaction").await);
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let log = InMemoryActivityLog::with_capacity(2);
        for i in 0..5 {
            log.push("Test", &[format!("line {i}")]).await;
        }

        let messages: Vec<String> = log.entries().await.into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["line 3", "line 4"]);
    }
}
