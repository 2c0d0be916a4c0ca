//! HTTP API for the checkout saga.
//!
//! Submits checkouts, exposes orders with their saga progress, and lets the
//! demo flip fault-injection toggles at runtime. Structured logging
//! (tracing) and Prometheus metrics come with every route.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use common::FaultToggles;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaServices;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub services: SagaServices,
    /// Live toggles; each new saga takes a copy.
    pub toggles: RwLock<FaultToggles>,
}

impl AppState {
    pub fn new(services: SagaServices) -> Self {
        Self {
            services,
            toggles: RwLock::new(FaultToggles::default()),
        }
    }

    /// Returns a snapshot of the current toggles.
    pub async fn toggles(&self) -> FaultToggles {
        *self.toggles.read().await
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/orders",
            get(routes::orders::list).post(routes::orders::create),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/saga", get(routes::orders::saga))
        .route(
            "/config",
            get(routes::toggles::get).put(routes::toggles::put),
        )
        .route(
            "/log",
            get(routes::activity::list).post(routes::activity::push),
        )
        .route("/accounts/{name}", get(routes::accounts::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
