//! Kafka bus tests
//!
//! These tests share one Kafka container. Each test uses its own topics and
//! groups, and they run serially to keep broker load predictable.
//!
//! ```bash
//! cargo test -p message-bus --test kafka_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use message_bus::{CommitMode, KafkaBus, KafkaSettings, Message, MessageBus, Subscription};
use serial_test::serial;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::kafka::apache::{KAFKA_PORT, Kafka};
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Kafka>,
    brokers: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Kafka::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(KAFKA_PORT).await.unwrap();

            Arc::new(ContainerInfo {
                container,
                brokers: format!("{}:{}", host, port),
            })
        })
        .await
        .clone()
}

async fn get_test_bus() -> KafkaBus {
    let info = get_container_info().await;
    let mut settings = KafkaSettings::new(info.brokers.clone());
    settings.partitions = 1;
    settings.request_timeout = Duration::from_secs(10);
    KafkaBus::connect(settings).unwrap()
}

fn unique(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}-{}", prefix, nanos)
}

async fn poll_once(sub: &mut Box<dyn Subscription>) -> Message {
    tokio::time::timeout(Duration::from_secs(30), sub.poll())
        .await
        .expect("poll timed out")
        .unwrap()
}

#[tokio::test]
#[serial]
async fn ensure_topics_exist_is_idempotent() {
    let bus = get_test_bus().await;
    let topic = unique("orders");

    bus.ensure_topics_exist(&[topic.clone()]).await.unwrap();
    bus.ensure_topics_exist(&[topic.clone()]).await.unwrap();

    let names = bus.topic_names().await.unwrap();
    assert!(names.contains(&topic));
    assert!(names.iter().all(|name| !name.starts_with("__")));
}

#[tokio::test]
#[serial]
async fn published_message_reaches_new_group() {
    let bus = get_test_bus().await;
    let topic = unique("payments");
    bus.ensure_topics_exist(&[topic.clone()]).await.unwrap();

    let sent = bus
        .publish(&topic, "order-1", b"hello".to_vec())
        .await
        .unwrap();
    assert_eq!(sent.partition, 0);

    let mut sub = bus
        .subscribe(&[topic.clone()], &unique("group"), CommitMode::Auto)
        .await
        .unwrap();
    let received = poll_once(&mut sub).await;

    assert_eq!(received.topic, topic);
    assert_eq!(received.key, "order-1");
    assert_eq!(received.payload, b"hello".to_vec());
    assert_eq!(received.offset, sent.offset);
}

#[tokio::test]
#[serial]
async fn rewind_redelivers_uncommitted_message() {
    let bus = get_test_bus().await;
    let topic = unique("ledger");
    bus.ensure_topics_exist(&[topic.clone()]).await.unwrap();
    bus.publish(&topic, "k", b"first".to_vec()).await.unwrap();
    bus.publish(&topic, "k", b"second".to_vec()).await.unwrap();

    let mut sub = bus
        .subscribe(&[topic.clone()], &unique("group"), CommitMode::Manual)
        .await
        .unwrap();
    let first = poll_once(&mut sub).await;
    assert_eq!(first.payload, b"first".to_vec());

    sub.rewind(&first).await.unwrap();
    let again = poll_once(&mut sub).await;
    assert_eq!(again.offset, first.offset);
    assert_eq!(again.payload, b"first".to_vec());
}

#[tokio::test]
#[serial]
async fn manual_commit_resumes_group_after_committed_offset() {
    let bus = get_test_bus().await;
    let topic = unique("inventory");
    let group = unique("group");
    bus.ensure_topics_exist(&[topic.clone()]).await.unwrap();
    bus.publish(&topic, "k", b"first".to_vec()).await.unwrap();
    bus.publish(&topic, "k", b"second".to_vec()).await.unwrap();

    {
        let mut sub = bus
            .subscribe(&[topic.clone()], &group, CommitMode::Manual)
            .await
            .unwrap();
        let first = poll_once(&mut sub).await;
        sub.commit(&first).await.unwrap();
        // Commits are asynchronous; let the broker store it before leaving.
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    let mut sub = bus
        .subscribe(&[topic.clone()], &group, CommitMode::Manual)
        .await
        .unwrap();
    let next = poll_once(&mut sub).await;
    assert_eq!(next.payload, b"second".to_vec());
}
