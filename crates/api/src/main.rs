//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use message_bus::{InMemoryBus, KafkaBus, SharedBus};
use saga::{PostgresProgressStore, SagaRuntime, SagaServices};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire the bus and the domain services
    let mut in_process = None;
    let bus: SharedBus = match config.kafka_settings() {
        Some(settings) => {
            tracing::info!(brokers = %settings.brokers, "using Kafka message bus");
            Arc::new(KafkaBus::connect(settings).expect("failed to configure Kafka clients"))
        }
        None => {
            tracing::info!("BUS_BROKERS not set, using in-process message bus");
            let bus = InMemoryBus::with_partitions(config.bus_partitions);
            in_process = Some(bus.clone());
            Arc::new(bus)
        }
    };
    let mut services = SagaServices::new(bus);

    if let Some(url) = &config.database_url {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .expect("failed to connect to database");
        let store = PostgresProgressStore::new(pool);
        store
            .run_migrations()
            .await
            .expect("failed to run migrations");
        services = services.with_progress(Arc::new(store));
        tracing::info!("saga progress stored in PostgreSQL");
    }

    // 4. Start the orchestrator and step invokers
    let runtime = SagaRuntime::start(services.clone(), config.saga_settings());

    // 5. Build the application
    let state = Arc::new(api::AppState::new(services));
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop consuming once no new checkouts can arrive
    runtime.shutdown().await;
    if let Some(bus) = in_process {
        bus.close();
    }

    tracing::info!("server shut down gracefully");
}
