//! Bulk traffic trigger.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use super::{AppState, MessageResponse};
use crate::error::ApiError;

/// Order id carried by every record a ping publishes.
pub const PING_ORDER_ID: &str = "123";

/// GET /ping: publishes one burst of records, initializing the producer first if needed.
pub async fn ping(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>, ApiError> {
    state
        .producer
        .initialize()
        .await
        .map_err(ApiError::ProducerInit)?;

    state
        .producer
        .publish_order(PING_ORDER_ID)
        .await
        .map_err(ApiError::Publish)?;

    Ok(Json(MessageResponse { message: "pong" }))
}
