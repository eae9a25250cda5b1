//! HTTP router
//!
//! Liveness, readiness and metrics endpoints around the streaming WebSocket.
//! Readiness reports NOT_SERVING until the engine is installed, so the
//! platform can bind-probe the port while the model loads.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::telemetry;
use crate::ws;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/transcription", get(ws::stream_transcription))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_serving() {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "SERVING" })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "NOT_SERVING" })),
        )
    }
}

async fn metrics_handler() -> Response {
    match telemetry::metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics not initialised",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_adapter_config::Config;

    #[test]
    fn router_builds() {
        let state = AppState::new(Config::default());
        let _ = create_router(state);
    }
}
