//! Order hand-off handler.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};

use dispatch_sync_core::OrderId;

use crate::error::AppError;
use crate::middleware::CurrentActor;
use crate::provider::{CreateOrderPayload, CreatedOrder};
use crate::state::AppState;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new().route("/orders/{id}/handoff", post(handoff))
}

/// Create a local order at the provider.
///
/// # Errors
///
/// Returns 409 if the order was already handed off.
pub async fn handoff(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<(StatusCode, Json<CreatedOrder>), AppError> {
    let engine = state.sessions().engine(actor).await;
    let created = engine.handoff_order(order_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
