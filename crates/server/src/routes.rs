//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router: the message socket plus the
/// operational endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/ws", get(handlers::socket::ws_handler))
        .route("/health", get(handlers::ops::health_check))
        .route("/ready", get(handlers::ops::readiness))
        .route("/metrics", get(metrics_handler))
        .route("/cache", get(handlers::ops::cache_summary))
        .route("/rooms", get(handlers::ops::rooms))
        .route("/cache/flush", post(handlers::ops::cache_flush))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let list: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(list)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
