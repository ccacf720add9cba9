//! HTTP trigger and composition root for the order ingestion service.
//!
//! Exposes `/ping` (publish a burst), `/hello`, `/health` and `/metrics`,
//! and wires consumer workers, the producer and the HTTP server together
//! under one cancellation token in [`orchestrator`].

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/ping", get(routes::ping::ping))
        .route("/hello", get(routes::hello::hello))
        .route("/health", get(routes::health::check))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
