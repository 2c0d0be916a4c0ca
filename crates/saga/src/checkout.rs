//! Entry point of a checkout.

use common::FaultToggles;
use domain::Order;
use rust_decimal::Decimal;

use crate::Result;
use crate::activity::{SUBJECT_ORCHESTRATOR, SUBJECT_ORDER};
use crate::envelope::{SagaEnvelope, SagaEvent};
use crate::publish::publish_event;
use crate::scope::SagaServices;

/// Creates an order and starts its saga.
///
/// The order is returned in `Processing`; the rest of the checkout happens
/// asynchronously. `toggles` is the snapshot every step of this saga sees.
#[tracing::instrument(skip(services, toggles))]
pub async fn submit_order(
    services: &SagaServices,
    amount: Decimal,
    toggles: FaultToggles,
) -> Result<Order> {
    services
        .activity
        .push(SUBJECT_ORDER, &["[TRANS - Create order]".to_string()])
        .await;
    let order = services.orders.create(amount).await?;
    services.progress.start(order.id).await?;

    publish_event(
        &*services.bus,
        &SagaEnvelope::new(SagaEvent::new_order(order.clone()), toggles),
    )
    .await?;

    metrics::counter!("saga_orders_submitted_total").increment(1);
    tracing::info!(order_id = %order.id, amount = %order.amount, "checkout submitted");
    services
        .activity
        .push(
            SUBJECT_ORCHESTRATOR,
            &[format!("[EVENT - New order] {} for {}", order.id, order.amount)],
        )
        .await;

    Ok(order)
}
