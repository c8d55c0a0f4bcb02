//! Operational surface: health, readiness, cache inspection, recovery.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

/// GET /health - overall status plus per-subsystem flags.
/// Intentionally unauthenticated for load balancers and probes.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let shared_ok = state.shared_store.ping().await.is_ok();
    let writer = state.writer.snapshot(state.readiness.writer_up());
    let listener_up = state.readiness.listener_up();

    let healthy = shared_ok && writer.running && listener_up;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "shared_store": if shared_ok { "ok" } else { "error" },
        "write_worker": if writer.running { "running" } else { "stopped" },
        "pubsub_listener": if listener_up { "running" } else { "stopped" },
        "writer": writer,
        "connections": state.registry.stats(),
    });
    (status, Json(body))
}

/// GET /ready - fails until the fan-out listener and write worker run.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.readiness.ready() {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "starting"})),
        )
    }
}

/// GET /cache - current L1 summary.
pub async fn cache_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"lists": state.cache.summary()}))
}

/// GET /rooms - subscriber counts per list.
pub async fn rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"rooms": state.registry.rooms_summary()}))
}

/// POST /cache/flush - drop L1 and this node's L2 entries. Manual
/// recovery; the next read-through rebuilds from the durable store.
pub async fn cache_flush(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let flushed = state
        .coordinator
        .flush_cache()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({"flushed": flushed})))
}
