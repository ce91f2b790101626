//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::domain::LearnerId;
use crate::state::AppState;

pub mod http;
pub mod ws;

/// Header carrying the authenticated learner id (set by the auth proxy).
pub const LEARNER_HEADER: &str = "x-learner-id";

/// Learner identity for a request; absent or blank means unauthenticated.
pub fn learner_from_headers(headers: &HeaderMap) -> Option<LearnerId> {
    headers
        .get(LEARNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| LearnerId(s.to_string()))
}

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/session/items", get(http::http_get_session_items))
        .route("/api/v1/session/generate", post(http::http_post_generate))
        .route("/api/v1/review", post(http::http_post_review))
        .route("/api/v1/usage", post(http::http_post_usage))
        .route("/api/v1/evaluate", post(http::http_post_evaluate))
        .route("/api/v1/exercise-types", get(http::http_get_exercise_types))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
