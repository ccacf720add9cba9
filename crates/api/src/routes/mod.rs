//! HTTP handlers.

pub mod health;
pub mod hello;
pub mod metrics;
pub mod ping;

use std::sync::Arc;

use messaging::MessageProducer;
use serde::Serialize;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub producer: Arc<dyn MessageProducer>,
}

/// `{"message": ...}` body shared by the trigger endpoints.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
