use thiserror::Error;

/// Errors that can occur when interacting with the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// A topic could not be created.
    #[error("Failed to create topic '{topic}': {reason}")]
    TopicCreation { topic: String, reason: String },

    /// A subscription could not be established.
    #[error("Failed to subscribe group '{group}': {reason}")]
    SubscriptionFailed { group: String, reason: String },

    /// A message value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker has been shut down.
    #[error("Message bus is closed")]
    Closed,

    /// A commit referenced a topic or partition the broker does not know.
    #[error("Unknown message position: {topic}/{partition}@{offset}")]
    UnknownPosition {
        topic: String,
        partition: usize,
        offset: u64,
    },

    /// Internal broker state was poisoned by a panicking thread.
    #[error("Broker state poisoned")]
    Poisoned,

    /// The Kafka client reported an error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Result type for message bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
