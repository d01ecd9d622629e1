//! `POST /chat` — accept a submission, mint identifiers, enqueue.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;

use cf_domain::ids::{CorrelationId, ThreadId};
use cf_domain::message::TurnRequest;

use crate::api::api_error;
use crate::state::AppState;

/// Message length bounds, counted in characters after trimming.
const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct ChatSubmission {
    pub message: String,
    /// Continue an existing conversation. Absent on first contact; the
    /// reply carries the minted id.
    #[serde(default)]
    pub thread_id: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatSubmission>,
) -> Response {
    // ── Input validation: nothing malformed reaches the queue ─────
    let message = body.message.trim().to_string();
    let char_count = message.chars().count();
    if char_count == 0 {
        return api_error(StatusCode::BAD_REQUEST, "message must not be empty");
    }
    if char_count > MAX_MESSAGE_CHARS {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("message exceeds {MAX_MESSAGE_CHARS} characters"),
        );
    }

    let thread_id = match &body.thread_id {
        Some(raw) => match raw.parse::<ThreadId>() {
            Ok(tid) => tid,
            Err(_) => return api_error(StatusCode::BAD_REQUEST, "malformed thread_id"),
        },
        None => ThreadId::mint(),
    };

    // ── Per-thread serialization: reject while a turn is in flight ─
    if let Some(inflight) = state.gate.inflight(thread_id) {
        match state.responses.get(inflight).await {
            // The previous turn already published; clear the stale hold.
            Ok(Some(_)) => state.gate.finish(thread_id),
            Ok(None) => {
                return api_error(
                    StatusCode::TOO_MANY_REQUESTS,
                    "a turn is already in progress on this thread",
                );
            }
            Err(e) => {
                return api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
            }
        }
    }

    let correlation_id = CorrelationId::mint();
    if state.gate.begin(thread_id, correlation_id).is_err() {
        return api_error(
            StatusCode::TOO_MANY_REQUESTS,
            "a turn is already in progress on this thread",
        );
    }

    let request = TurnRequest {
        correlation_id,
        thread_id,
        message,
        submitted_at: Utc::now(),
        actor_id: bearer_identity(&headers),
    };

    if let Err(e) = state.queue.publish(request).await {
        state.gate.finish(thread_id);
        tracing::error!(error = %e, "failed to enqueue request");
        return api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "correlation_id": correlation_id,
            "thread_id": thread_id,
        })),
    )
        .into_response()
}

/// Pass-through of the bearer identity; no validation beyond shape.
fn bearer_identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_identity_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_identity(&headers), None);

        headers.insert("authorization", "Bearer actor-42".parse().unwrap());
        assert_eq!(bearer_identity(&headers), Some("actor-42".into()));

        headers.insert("authorization", "Basic xyz".parse().unwrap());
        assert_eq!(bearer_identity(&headers), None);
    }
}
