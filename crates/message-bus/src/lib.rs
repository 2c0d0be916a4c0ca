//! Message bus for the checkout saga.
//!
//! This crate provides the transport every saga participant talks through:
//! - [`MessageBus`] trait: publish to named, key-partitioned topics and
//!   subscribe as a member of a consumer group
//! - [`Subscription`] trait: pull-based handle with auto or manual commit
//! - [`KafkaBus`]: the production transport, backed by a Kafka cluster
//! - [`InMemoryBus`]: an in-process broker with the same semantics, for
//!   tests and single-process runs
//! - [`ConsumerRuntime`]: one supervised task per subscription with
//!   per-message dependency scopes and fault containment

pub mod bus;
pub mod error;
pub mod kafka;
pub mod memory;
pub mod message;
pub mod runtime;

pub use bus::{Acknowledger, CommitMode, MessageBus, MessageBusExt, SharedBus, Subscription};
pub use error::{BusError, Result};
pub use kafka::{KafkaBus, KafkaSettings};
pub use memory::{DEFAULT_PARTITIONS, InMemoryBus};
pub use message::Message;
pub use runtime::{
    ConsumerRuntime, DEFAULT_REDELIVERY_DELAY, MessageHandler, ScopeFactory, SubscriptionSpec,
};
