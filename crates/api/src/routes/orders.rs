//! Checkout submission and order queries.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::Order;
use rust_decimal::Decimal;
use saga::{SagaProgress, SagaProgressStoreExt, submit_order};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub amount: Decimal,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub amount: Decimal,
    pub status: String,
    pub failure_details: Option<String>,
    pub creation_time: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            amount: order.amount,
            status: order.status.to_string(),
            failure_details: order.failure_details,
            creation_time: order.creation_time,
        }
    }
}

#[derive(Serialize)]
pub struct StepRecordResponse {
    pub trigger: String,
    pub step: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SagaProgressResponse {
    pub current_step: String,
    pub attempts: u32,
    pub history: Vec<StepRecordResponse>,
    pub updated_at: DateTime<Utc>,
}

impl From<SagaProgress> for SagaProgressResponse {
    fn from(progress: SagaProgress) -> Self {
        Self {
            current_step: progress.current_step.to_string(),
            attempts: progress.attempts,
            history: progress
                .history
                .into_iter()
                .map(|record| StepRecordResponse {
                    trigger: record.trigger,
                    step: record.step.to_string(),
                    recorded_at: record.recorded_at,
                })
                .collect(),
            updated_at: progress.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct OrderDetailsResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub saga: Option<SagaProgressResponse>,
}

// -- Handlers --

/// POST /orders: create an order and start its checkout saga.
///
/// The live fault toggles are snapshotted into the saga here.
#[tracing::instrument(skip(state, req), fields(amount = %req.amount))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let toggles = state.toggles().await;
    let order = submit_order(&state.services, req.amount, toggles).await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders: every order, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.services.orders.list().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: one order with its saga progress.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailsResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .services
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    let progress = state.services.progress.load(order_id).await?;

    Ok(Json(OrderDetailsResponse {
        order: order.into(),
        saga: progress.map(SagaProgressResponse::from),
    }))
}

/// GET /orders/{id}/saga: the saga progress of one order.
#[tracing::instrument(skip(state))]
pub async fn saga(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaProgressResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let progress = state.services.progress.require(order_id).await?;
    Ok(Json(progress.into()))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
