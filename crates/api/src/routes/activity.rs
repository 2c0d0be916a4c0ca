//! Demo activity log.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use saga::ActivityEntry;
use serde::Deserialize;

use crate::AppState;

#[derive(Deserialize)]
pub struct LogRequest {
    pub subject: String,
    pub message: String,
}

/// POST /log: append lines pushed by other processes.
pub async fn push(
    State(state): State<Arc<AppState>>,
    Json(lines): Json<Vec<LogRequest>>,
) -> StatusCode {
    for line in lines {
        state
            .services
            .activity
            .push(&line.subject, &[line.message])
            .await;
    }
    StatusCode::NO_CONTENT
}

/// GET /log: retained lines, oldest first.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<ActivityEntry>> {
    Json(state.services.activity.entries().await)
}
