//! Main application router.

use crate::{
    controllers::{health_controller, jobs_controller},
    middleware::{logging_middleware, require_api_key},
    state::AppState,
};
use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use relayq_config::ServerConfig;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the main application router.
///
/// `/jobs` and `/dlq` require the `x-api-key` header; health endpoints and
/// the metrics path do not.
pub fn create_router(state: AppState, server_config: &ServerConfig, metrics_path: &str) -> Router {
    let api_router = jobs_controller::router()
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    let router = Router::new()
        // Health endpoints (no auth required)
        .merge(health_controller::router())
        .merge(api_router)
        .route(metrics_path, get(health_controller::metrics))
        .route("/", get(root))
        .with_state(state)
        .layer(DefaultBodyLimit::max(server_config.max_body_size))
        .layer(TimeoutLayer::new(server_config.request_timeout()))
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    info!(metrics_path, "Router created with producer and health endpoints");
    router
}

/// Root endpoint handler.
async fn root() -> &'static str {
    "relayq job queue API"
}
