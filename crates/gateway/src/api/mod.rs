//! Front API — the thin HTTP boundary.
//!
//! - `POST /chat`                          — submit, returns correlation + thread ids
//! - `GET  /chat/response/:correlation_id` — poll
//! - `GET  /chat/stream/:correlation_id`   — live SSE feed
//! - `GET  /chat/history/…`                — read-only projections
//! - `GET  /healthz`                       — liveness

pub mod chat;
pub mod history;
pub mod poll;
pub mod stream;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let allowed = state.config.server.allowed_origins.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin
                .to_str()
                .map(|o| allowed.iter().any(|pattern| origin_matches(pattern, o)))
                .unwrap_or(false)
        }))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/chat", post(chat::submit))
        .route("/chat/response/:correlation_id", get(poll::poll))
        .route("/chat/stream/:correlation_id", get(stream::stream))
        .route("/chat/history/recent", get(history::recent))
        .route(
            "/chat/history/most-helpful-searches",
            get(history::most_helpful_searches),
        )
        .route(
            "/chat/history/most-helpful-documents",
            get(history::most_helpful_documents),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Origin matching with `:*` port wildcards
/// (`http://localhost:*` matches any localhost port).
fn origin_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(":*") {
        return origin == prefix
            || origin
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(':'));
    }
    pattern == origin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_wildcard_port() {
        assert!(origin_matches("http://localhost:*", "http://localhost:3000"));
        assert!(origin_matches("http://localhost:*", "http://localhost"));
        assert!(!origin_matches("http://localhost:*", "http://localhost.evil.com"));
        assert!(!origin_matches("http://localhost:*", "https://example.com"));
    }

    #[test]
    fn origin_exact_and_star() {
        assert!(origin_matches("*", "https://anything.example"));
        assert!(origin_matches("https://app.example.org", "https://app.example.org"));
        assert!(!origin_matches("https://app.example.org", "https://app.example.com"));
    }
}
