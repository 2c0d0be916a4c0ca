use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::{
    BusError, Message, Result,
    bus::{Acknowledger, CommitMode, MessageBus, Subscription},
};

/// Number of partitions every topic is created with.
pub const DEFAULT_PARTITIONS: usize = 3;

type TopicPartition = (String, usize);

#[derive(Debug, Clone)]
struct Record {
    sequence: u64,
    message: Message,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Member id to the topics it subscribed to.
    members: BTreeMap<u64, Vec<String>>,
    assignments: HashMap<u64, Vec<TopicPartition>>,
    /// Next offset to deliver per partition once a member takes it over.
    committed: HashMap<TopicPartition, u64>,
    generation: u64,
}

impl GroupState {
    /// Spreads every partition of every subscribed topic round-robin over
    /// the members that subscribed to that topic.
    fn rebalance(&mut self, topics: &HashMap<String, Vec<Vec<Record>>>) {
        let mut wanted: Vec<&String> = self.members.values().flatten().collect();
        wanted.sort();
        wanted.dedup();

        let mut assignments: HashMap<u64, Vec<TopicPartition>> =
            self.members.keys().map(|id| (*id, Vec::new())).collect();

        for topic in wanted {
            let eligible: Vec<u64> = self
                .members
                .iter()
                .filter(|(_, subscribed)| subscribed.contains(topic))
                .map(|(id, _)| *id)
                .collect();
            let partitions = topics.get(topic).map(Vec::len).unwrap_or(0);

            for partition in 0..partitions {
                let member = eligible[partition % eligible.len()];
                assignments
                    .entry(member)
                    .or_default()
                    .push((topic.clone(), partition));
            }
        }

        self.assignments = assignments;
        self.generation += 1;
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<Record>>>,
    groups: HashMap<String, GroupState>,
    next_member_id: u64,
    next_sequence: u64,
}

impl BrokerState {
    /// Creates the topic if missing; returns true if it was created.
    fn ensure_topic(&mut self, topic: &str, partitions: usize) -> bool {
        if self.topics.contains_key(topic) {
            return false;
        }
        self.topics
            .insert(topic.to_string(), vec![Vec::new(); partitions]);
        true
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<BrokerState>,
    notify: Notify,
    closed: AtomicBool,
    partitions: usize,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>> {
        self.state.lock().map_err(|_| BusError::Poisoned)
    }
}

/// In-memory message broker with Kafka-like semantics.
///
/// Topics are append-only logs split into a fixed number of partitions;
/// the partition is chosen by hashing the message key, so all messages with
/// one key are delivered in publish order. Consumer groups split partitions
/// between their members and track a committed offset per partition.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Creates a broker with [`DEFAULT_PARTITIONS`] partitions per topic.
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Creates a broker with the given number of partitions per topic.
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                partitions: partitions.max(1),
            }),
        }
    }

    /// Returns the number of partitions per topic.
    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Closes the broker; pending and future polls fail with [`BusError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Returns true if the broker has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns every message on a topic in publish order.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        let Ok(state) = self.inner.lock() else {
            return Vec::new();
        };
        let mut records: Vec<&Record> = state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.sequence);
        records.into_iter().map(|r| r.message.clone()).collect()
    }

    /// Returns the total number of messages on a topic.
    pub fn message_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .map(|state| {
                state
                    .topics
                    .get(topic)
                    .map(|partitions| partitions.iter().map(Vec::len).sum())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Returns the committed offset of a group on one partition, if any.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: usize) -> Option<u64> {
        let state = self.inner.lock().ok()?;
        state
            .groups
            .get(group)?
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Returns the number of live members in a consumer group.
    pub fn member_count(&self, group: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.groups.get(group).map(|g| g.members.len()))
            .unwrap_or(0)
    }
}

/// Picks the partition for a key with FNV-1a, which is stable across runs.
fn partition_for(key: &str, partitions: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % partitions as u64) as usize
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Message> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let message = {
            let mut guard = self.inner.lock()?;
            let state = &mut *guard;
            if state.ensure_topic(topic, self.inner.partitions) {
                tracing::debug!(topic, "topic auto-created on publish");
            }

            let partition = partition_for(key, self.inner.partitions);
            let sequence = state.next_sequence;
            state.next_sequence += 1;

            let log = state
                .topics
                .get_mut(topic)
                .and_then(|partitions| partitions.get_mut(partition))
                .ok_or_else(|| BusError::TopicCreation {
                    topic: topic.to_string(),
                    reason: "partition missing".to_string(),
                })?;

            let message = Message {
                topic: topic.to_string(),
                partition,
                offset: log.len() as u64,
                key: key.to_string(),
                payload,
                timestamp: Utc::now(),
            };
            log.push(Record {
                sequence,
                message: message.clone(),
            });
            message
        };

        self.inner.notify.notify_waiters();
        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        tracing::debug!(
            topic,
            key,
            partition = message.partition,
            offset = message.offset,
            "message published"
        );

        Ok(message)
    }

    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
        mode: CommitMode,
    ) -> Result<Box<dyn Subscription>> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if topics.is_empty() {
            return Err(BusError::SubscriptionFailed {
                group: group.to_string(),
                reason: "no topics given".to_string(),
            });
        }

        let member_id = {
            let mut guard = self.inner.lock()?;
            let state = &mut *guard;
            for topic in topics {
                state.ensure_topic(topic, self.inner.partitions);
            }

            let member_id = state.next_member_id;
            state.next_member_id += 1;

            let group_state = state.groups.entry(group.to_string()).or_default();
            group_state.members.insert(member_id, topics.to_vec());
            group_state.rebalance(&state.topics);
            member_id
        };

        // Wake existing members so they pick up the new assignment.
        self.inner.notify.notify_waiters();
        tracing::info!(group, member_id, %mode, ?topics, "joined consumer group");

        Ok(Box::new(InMemorySubscription {
            inner: Arc::clone(&self.inner),
            member_id,
            group: group.to_string(),
            topics: topics.to_vec(),
            mode,
            generation: 0,
            assigned: Vec::new(),
            positions: HashMap::new(),
            cursor: 0,
        }))
    }

    async fn ensure_topics_exist(&self, topics: &[String]) -> Result<()> {
        let mut state = self.inner.lock()?;
        for topic in topics {
            if state.ensure_topic(topic, self.inner.partitions) {
                tracing::info!(topic = %topic, partitions = self.inner.partitions, "topic created");
            }
        }
        Ok(())
    }

    async fn topic_names(&self) -> Result<Vec<String>> {
        let state = self.inner.lock()?;
        let mut names: Vec<String> = state.topics.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// One member of a consumer group on an [`InMemoryBus`].
struct InMemorySubscription {
    inner: Arc<Inner>,
    member_id: u64,
    group: String,
    topics: Vec<String>,
    mode: CommitMode,
    /// Group generation the local positions were loaded for.
    generation: u64,
    assigned: Vec<TopicPartition>,
    positions: HashMap<TopicPartition, u64>,
    cursor: usize,
}

impl InMemorySubscription {
    /// Takes the next deliverable message without waiting.
    fn try_next(&mut self) -> Result<Option<Message>> {
        let mut guard = self.inner.lock()?;
        let state = &mut *guard;
        let group = state
            .groups
            .get_mut(&self.group)
            .ok_or_else(|| BusError::SubscriptionFailed {
                group: self.group.clone(),
                reason: "group no longer exists".to_string(),
            })?;

        if self.generation != group.generation {
            // Rebalanced: resume every assigned partition from the committed
            // offset, which redelivers anything left unacknowledged.
            self.generation = group.generation;
            self.assigned = group
                .assignments
                .get(&self.member_id)
                .cloned()
                .unwrap_or_default();
            self.positions = self
                .assigned
                .iter()
                .map(|tp| {
                    let committed = group.committed.get(tp).copied().unwrap_or(0);
                    (tp.clone(), committed)
                })
                .collect();
            self.cursor = 0;
        }

        let assigned_count = self.assigned.len();
        for step in 0..assigned_count {
            let index = (self.cursor + step) % assigned_count;
            let tp = &self.assigned[index];
            let position = self.positions.get(tp).copied().unwrap_or(0);

            let Some(record) = state
                .topics
                .get(&tp.0)
                .and_then(|partitions| partitions.get(tp.1))
                .and_then(|log| log.get(position as usize))
            else {
                continue;
            };

            let message = record.message.clone();
            self.positions.insert(tp.clone(), position + 1);
            if self.mode == CommitMode::Auto {
                let committed = group.committed.entry(tp.clone()).or_insert(0);
                *committed = (*committed).max(position + 1);
            }
            self.cursor = (index + 1) % assigned_count;
            return Ok(Some(message));
        }

        Ok(None)
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn poll(&mut self) -> Result<Message> {
        let inner = Arc::clone(&self.inner);
        loop {
            // Register interest before checking so a publish in between is
            // not missed.
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if inner.closed.load(Ordering::Acquire) {
                return Err(BusError::Closed);
            }
            if let Some(message) = self.try_next()? {
                return Ok(message);
            }

            notified.await;
        }
    }

    async fn rewind(&mut self, message: &Message) -> Result<()> {
        let tp = (message.topic.clone(), message.partition);
        if let Some(position) = self.positions.get_mut(&tp) {
            *position = (*position).min(message.offset);
        }
        Ok(())
    }

    fn acknowledger(&self) -> Arc<dyn Acknowledger> {
        Arc::new(InMemoryAcknowledger {
            inner: Arc::clone(&self.inner),
            group: self.group.clone(),
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

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.inner.lock() {
            let state = &mut *guard;
            if let Some(group) = state.groups.get_mut(&self.group) {
                group.members.remove(&self.member_id);
                group.rebalance(&state.topics);
            }
        }
        self.inner.notify.notify_waiters();
        tracing::debug!(group = %self.group, member_id = self.member_id, "left consumer group");
    }
}

struct InMemoryAcknowledger {
    inner: Arc<Inner>,
    group: String,
}

#[async_trait]
impl Acknowledger for InMemoryAcknowledger {
    async fn commit(&self, message: &Message) -> Result<()> {
        let mut guard = self.inner.lock()?;
        let state = &mut *guard;

        let known = state
            .topics
            .get(&message.topic)
            .and_then(|partitions| partitions.get(message.partition))
            .is_some_and(|log| (message.offset as usize) < log.len());
        if !known {
            return Err(BusError::UnknownPosition {
                topic: message.topic.clone(),
                partition: message.partition,
                offset: message.offset,
            });
        }

        let group = state.groups.entry(self.group.clone()).or_default();
        let committed = group
            .committed
            .entry((message.topic.clone(), message.partition))
            .or_insert(0);
        *committed = (*committed).max(message.offset + 1);

        tracing::trace!(
            group = %self.group,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "offset committed"
        );
        Ok(())
    }
}
