//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use messaging::MessagingError;
use orders::OrderError;
use thiserror::Error;

/// Errors surfaced to HTTP callers. Every variant maps to a 500.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The producer could not connect to the broker.
    #[error("Failed to initialize producer")]
    ProducerInit(#[source] MessagingError),

    /// A burst was aborted by a failed send.
    #[error("Failed to publish message")]
    Publish(#[source] MessagingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let cause = match &self {
            ApiError::ProducerInit(err) | ApiError::Publish(err) => err.to_string(),
        };
        tracing::error!(error = %self, %cause, "request failed");

        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

/// Fatal failures while bringing the service up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("Order store unavailable: {0}")]
    Orders(#[from] OrderError),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
