//! Runtime fault-injection toggles.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::FaultToggles;

use crate::AppState;

/// GET /config: the toggles new checkouts will be started with.
pub async fn get(State(state): State<Arc<AppState>>) -> Json<FaultToggles> {
    Json(state.toggles().await)
}

/// PUT /config: replace the toggles.
///
/// Sagas already in flight keep the snapshot they started with.
#[tracing::instrument(skip(state))]
pub async fn put(
    State(state): State<Arc<AppState>>,
    Json(toggles): Json<FaultToggles>,
) -> StatusCode {
    *state.toggles.write().await = toggles;
    metrics::counter!("api_fault_toggle_updates_total").increment(1);
    tracing::info!("fault toggles updated");
    StatusCode::NO_CONTENT
}
