//! Kafka-backed message bus.
//!
//! Topics, partitions and consumer groups are the broker's own: several
//! processes subscribing with the same group split the partitions between
//! them, and a manual-commit member that dies hands its uncommitted
//! messages to whoever takes the partition over.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode as OffsetCommit, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message as _};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::types::RDKafkaErrorCode;

use crate::{
    BusError, Message, Result,
    bus::{Acknowledger, CommitMode, MessageBus, Subscription},
};

/// Connection and topic settings for [`KafkaBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Comma-separated `host:port` list.
    pub brokers: String,
    /// Partitions for topics this bus creates.
    pub partitions: i32,
    /// Replication factor for topics this bus creates.
    pub replication: i32,
    /// Deadline for produce, admin and metadata requests.
    pub request_timeout: Duration,
}

impl KafkaSettings {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            partitions: crate::DEFAULT_PARTITIONS as i32,
            replication: 1,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config
    }
}

/// Message bus backed by a Kafka cluster.
#[derive(Clone)]
pub struct KafkaBus {
    settings: KafkaSettings,
    producer: FutureProducer,
    admin: Arc<AdminClient<DefaultClientContext>>,
}

impl KafkaBus {
    /// Creates the producer and admin clients.
    ///
    /// Kafka clients connect lazily, so an unreachable broker shows up on
    /// the first request rather than here.
    pub fn connect(settings: KafkaSettings) -> Result<Self> {
        let timeout_ms = settings.request_timeout.as_millis().to_string();
        let producer: FutureProducer = settings
            .client_config()
            .set("message.timeout.ms", &timeout_ms)
            .create()?;
        let admin: AdminClient<DefaultClientContext> = settings.client_config().create()?;

        tracing::info!(brokers = %settings.brokers, "kafka bus configured");
        Ok(Self {
            settings,
            producer,
            admin: Arc::new(admin),
        })
    }

    pub fn settings(&self) -> &KafkaSettings {
        &self.settings
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Message> {
        let record = FutureRecord::to(topic).key(key).payload(payload.as_slice());
        let (partition, offset) = self
            .producer
            .send(record, self.settings.request_timeout)
            .await
            .map_err(|(e, _)| BusError::Kafka(e))?;

        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        tracing::debug!(topic, key, partition, offset, "message published");

        Ok(Message {
            topic: topic.to_string(),
            partition: usize::try_from(partition).unwrap_or_default(),
            offset: u64::try_from(offset).unwrap_or_default(),
            key: key.to_string(),
            payload,
            timestamp: Utc::now(),
        })
    }

    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
        mode: CommitMode,
    ) -> Result<Box<dyn Subscription>> {
        if topics.is_empty() {
            return Err(BusError::SubscriptionFailed {
                group: group.to_string(),
                reason: "no topics given".to_string(),
            });
        }

        let auto_commit = if mode == CommitMode::Auto { "true" } else { "false" };
        let consumer: StreamConsumer = self
            .settings
            .client_config()
            .set("group.id", group)
            .set("enable.auto.commit", auto_commit)
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BusError::SubscriptionFailed {
                group: group.to_string(),
                reason: e.to_string(),
            })?;

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| BusError::SubscriptionFailed {
                group: group.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(group, %mode, ?topics, "joined consumer group");
        Ok(Box::new(KafkaSubscription {
            consumer: Arc::new(consumer),
            group: group.to_string(),
            topics: topics.to_vec(),
            mode,
            request_timeout: self.settings.request_timeout,
        }))
    }

    async fn ensure_topics_exist(&self, topics: &[String]) -> Result<()> {
        let existing = self.topic_names().await?;
        let missing: Vec<NewTopic<'_>> = topics
            .iter()
            .filter(|topic| !existing.contains(*topic))
            .map(|topic| {
                NewTopic::new(
                    topic,
                    self.settings.partitions,
                    TopicReplication::Fixed(self.settings.replication),
                )
            })
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let options = AdminOptions::new().operation_timeout(Some(self.settings.request_timeout));
        for result in self.admin.create_topics(&missing, &options).await? {
            match result {
                Ok(topic) => {
                    tracing::info!(
                        topic = %topic,
                        partitions = self.settings.partitions,
                        "topic created"
                    );
                }
                // Another process won the race.
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((topic, code)) => {
                    return Err(BusError::TopicCreation {
                        topic,
                        reason: code.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn topic_names(&self) -> Result<Vec<String>> {
        let producer = self.producer.clone();
        let timeout = self.settings.request_timeout;
        let mut names = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let metadata = producer.client().fetch_metadata(None, timeout)?;
            Ok(metadata
                .topics()
                .iter()
                .map(|topic| topic.name().to_string())
                .filter(|name| !name.starts_with("__"))
                .collect())
        })
        .await
        .map_err(|_| BusError::Kafka(KafkaError::Canceled))??;
        names.sort();
        Ok(names)
    }
}

/// One member of a Kafka consumer group.
struct KafkaSubscription {
    consumer: Arc<StreamConsumer>,
    group: String,
    topics: Vec<String>,
    mode: CommitMode,
    request_timeout: Duration,
}

fn to_message(record: &BorrowedMessage<'_>) -> Message {
    Message {
        topic: record.topic().to_string(),
        partition: usize::try_from(record.partition()).unwrap_or_default(),
        offset: u64::try_from(record.offset()).unwrap_or_default(),
        key: record
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .unwrap_or_default(),
        payload: record.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp: record
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now),
    }
}

/// Converts a bus position to Kafka's signed partition and offset.
fn kafka_position(message: &Message) -> Result<(i32, i64)> {
    let unknown = || BusError::UnknownPosition {
        topic: message.topic.clone(),
        partition: message.partition,
        offset: message.offset,
    };
    let partition = i32::try_from(message.partition).map_err(|_| unknown())?;
    let offset = i64::try_from(message.offset).map_err(|_| unknown())?;
    Ok((partition, offset))
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn poll(&mut self) -> Result<Message> {
        let record = self.consumer.recv().await?;
        Ok(to_message(&record))
    }

    async fn rewind(&mut self, message: &Message) -> Result<()> {
        let (partition, offset) = kafka_position(message)?;
        match self.consumer.seek(
            &message.topic,
            partition,
            Offset::Offset(offset),
            self.request_timeout,
        ) {
            Ok(()) => Ok(()),
            // Revoked in the meantime; the new owner starts from the commit.
            Err(KafkaError::Seek(reason)) => {
                tracing::debug!(group = %self.group, reason = %reason, "seek skipped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn acknowledger(&self) -> Arc<dyn Acknowledger> {
        Arc::new(KafkaAcknowledger {
            consumer: Arc::clone(&self.consumer),
        })
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn topics(&self) -> &[String] {
        &self.topics
    }

    fn commit_mode(&self) -> CommitMode {
        self.mode
    }
}

struct KafkaAcknowledger {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl Acknowledger for KafkaAcknowledger {
    async fn commit(&self, message: &Message) -> Result<()> {
        let (partition, offset) = kafka_position(message)?;
        let mut list = TopicPartitionList::new();
        // Kafka stores the next offset to read, not the last one handled.
        list.add_partition_offset(&message.topic, partition, Offset::Offset(offset + 1))?;
        self.consumer.commit(&list, OffsetCommit::Async)?;

        tracing::trace!(
            topic = %message.topic,
            partition,
            offset,
            "offset committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_at(partition: usize, offset: u64) -> Message {
        Message {
            topic: "T".to_string(),
            partition,
            offset,
            key: "k".to_string(),
            payload: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_settings_defaults() {
        let settings = KafkaSettings::new("localhost:9092");
        assert_eq!(settings.brokers, "localhost:9092");
        assert_eq!(settings.partitions, 3);
        assert_eq!(settings.replication, 1);
    }

    #[test]
    fn test_position_conversion() {
        assert_eq!(kafka_position(&message_at(2, 41)).unwrap(), (2, 41));
        assert!(matches!(
            kafka_position(&message_at(usize::MAX, 0)),
            Err(BusError::UnknownPosition { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let bus = KafkaBus::connect(KafkaSettings::new("127.0.0.1:1")).unwrap();
        assert_eq!(bus.settings().brokers, "127.0.0.1:1");
    }
}
