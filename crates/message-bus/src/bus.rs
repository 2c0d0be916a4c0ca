use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;
use crate::message::{self, Message};

/// How a subscription advances its group's committed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitMode {
    /// The offset is committed as soon as a message is handed out.
    ///
    /// A crash between receipt and processing loses the message.
    Auto,

    /// The caller commits explicitly once it reached a terminal outcome.
    ///
    /// Uncommitted messages are redelivered after a rewind or a rebalance.
    Manual,
}

impl CommitMode {
    /// Returns the mode name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitMode::Auto => "auto",
            CommitMode::Manual => "manual",
        }
    }
}

impl std::fmt::Display for CommitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acknowledges processed messages on behalf of a subscription.
///
/// Split from [`Subscription`] so a handler can commit while the consumer
/// loop keeps ownership of the pull handle.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Commits the given message, advancing the group's offset past it.
    async fn commit(&self, message: &Message) -> Result<()>;
}

/// A pull-based handle belonging to one member of a consumer group.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Waits for and returns the next message assigned to this member.
    ///
    /// Cancel-safe: dropping the future before it resolves never loses a
    /// message.
    async fn poll(&mut self) -> Result<Message>;

    /// Moves the read position of the message's partition back to the
    /// message, so the next poll delivers it again.
    ///
    /// Has no effect if the partition is no longer assigned to this member;
    /// its new owner resumes from the committed offset.
    async fn rewind(&mut self, message: &Message) -> Result<()>;

    /// Returns a handle that commits messages for this subscription.
    fn acknowledger(&self) -> Arc<dyn Acknowledger>;

    /// Returns the consumer group this subscription belongs to.
    fn group(&self) -> &str;

    /// Returns the topics this subscription reads.
    fn topics(&self) -> &[String];

    /// Returns the commit mode of this subscription.
    fn commit_mode(&self) -> CommitMode;

    /// Commits the given message.
    async fn commit(&self, message: &Message) -> Result<()> {
        self.acknowledger().commit(message).await
    }
}

/// Core trait for message bus implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Appends a record to a topic, creating the topic if needed.
    ///
    /// Fire-and-forget from the saga's point of view: the returned message
    /// only reports where the broker placed the record.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Message>;

    /// Joins `group` as a new member reading `topics`.
    ///
    /// Members of the same group compete for partitions; each message is
    /// delivered to one member of the group.
    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
        mode: CommitMode,
    ) -> Result<Box<dyn Subscription>>;

    /// Creates any of the named topics that do not exist yet.
    ///
    /// Idempotent and best-effort.
    async fn ensure_topics_exist(&self, topics: &[String]) -> Result<()>;

    /// Returns the names of all existing topics, sorted.
    async fn topic_names(&self) -> Result<Vec<String>>;
}

/// A message bus shared between consumer contexts and request handlers.
pub type SharedBus = Arc<dyn MessageBus>;

/// Extension trait providing typed convenience methods for message buses.
#[async_trait]
pub trait MessageBusExt: MessageBus {
    /// Publishes a value encoded as JSON.
    async fn publish_json<T>(&self, topic: &str, key: &str, value: &T) -> Result<Message>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = message::encode(value)?;
        self.publish(topic, key, payload).await
    }
}

// Blanket implementation for all MessageBus implementations
impl<T: MessageBus + ?Sized> MessageBusExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_mode_display() {
        assert_eq!(CommitMode::Auto.to_string(), "auto");
        assert_eq!(CommitMode::Manual.to_string(), "manual");
    }
}
