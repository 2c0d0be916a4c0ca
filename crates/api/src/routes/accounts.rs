//! Ledger account lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub description: String,
    pub creation_time: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AccountResponse {
    pub name: String,
    pub balance: Decimal,
    pub transactions: Vec<TransactionResponse>,
}

/// GET /accounts/{name}: balance and transactions of one account.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let ledger = &state.services.ledger;
    let account = ledger.account(&name).await?;
    let transactions = ledger
        .transactions_for_account(&name)
        .await?
        .into_iter()
        .map(|t| TransactionResponse {
            id: t.id.to_string(),
            order_id: t.order_id.to_string(),
            amount: t.amount,
            description: t.description,
            creation_time: t.creation_time,
        })
        .collect();

    Ok(Json(AccountResponse {
        name: account.name,
        balance: account.balance,
        transactions,
    }))
}
