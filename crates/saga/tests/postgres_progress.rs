//! PostgreSQL saga progress store tests
//!
//! These tests share one PostgreSQL container and truncate the table before
//! each test, so they run serially.
//!
//! ```bash
//! cargo test -p saga --test postgres_progress
//! ```

use std::sync::Arc;

use common::OrderId;
use saga::{
    FailureOrigin, PostgresProgressStore, SagaProgressStore, SagaProgressStoreExt, SagaStep,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_progress.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresProgressStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_progress")
        .execute(&pool)
        .await
        .unwrap();

    PostgresProgressStore::new(pool)
}

#[tokio::test]
#[serial]
async fn start_and_load() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    assert!(store.load(order_id).await.unwrap().is_none());

    let started = store.start(order_id).await.unwrap();
    assert_eq!(started.current_step, SagaStep::Started);

    let loaded = store.load(order_id).await.unwrap().unwrap();
    assert_eq!(loaded.order_id, order_id);
    assert_eq!(loaded.current_step, SagaStep::Started);
    assert_eq!(loaded.history.len(), 1);
    assert_eq!(loaded.attempts, 0);
}

#[tokio::test]
#[serial]
async fn start_twice_keeps_history() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    store.start(order_id).await.unwrap();
    store
        .record(order_id, "NewOrder", SagaStep::AwaitingDebit)
        .await
        .unwrap();
    store.start(order_id).await.unwrap();

    let loaded = store.load(order_id).await.unwrap().unwrap();
    assert_eq!(loaded.current_step, SagaStep::AwaitingDebit);
    assert_eq!(loaded.history.len(), 2);
}

#[tokio::test]
#[serial]
async fn record_round_trips_tagged_steps() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    store.start(order_id).await.unwrap();
    store
        .record(
            order_id,
            "OrderPaymentFailure",
            SagaStep::Compensating {
                origin: FailureOrigin::PaymentCharge,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        store.current_step(order_id).await.unwrap(),
        Some(SagaStep::Compensating {
            origin: FailureOrigin::PaymentCharge
        })
    );
    assert!(
        store
            .has_processed(order_id, "OrderPaymentFailure")
            .await
            .unwrap()
    );
    assert!(!store.has_processed(order_id, "NewOrder").await.unwrap());
}

#[tokio::test]
#[serial]
async fn terminal_step_is_sticky() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    store
        .record(order_id, "MarkOrderAsSuccess", SagaStep::Completed)
        .await
        .unwrap();
    store
        .record(
            order_id,
            "OrderSuccessPayment",
            SagaStep::AwaitingCompletion,
        )
        .await
        .unwrap();

    let loaded = store.load(order_id).await.unwrap().unwrap();
    assert_eq!(loaded.current_step, SagaStep::Completed);
    assert!(loaded.has_processed("OrderSuccessPayment"));
}

#[tokio::test]
#[serial]
async fn record_attempts_persists() {
    let store = get_test_store().await;
    let order_id = OrderId::new();

    store.start(order_id).await.unwrap();
    store.record_attempts(order_id, 5).await.unwrap();

    assert_eq!(store.load(order_id).await.unwrap().unwrap().attempts, 5);
}

#[tokio::test]
#[serial]
async fn concurrent_records_are_serialized() {
    let store = Arc::new(get_test_store().await);
    let order_id = OrderId::new();
    store.start(order_id).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .record(order_id, &format!("Trigger{i}"), SagaStep::AwaitingCharge)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let loaded = store.load(order_id).await.unwrap().unwrap();
    // Submitted plus one entry per writer.
    assert_eq!(loaded.history.len(), 9);
}
