//! `GET /chat/stream/:correlation_id` — the live SSE feed.
//!
//! On connect the handler opens a live read over the progress log and
//! relays each event as one SSE frame, without buffering beyond the
//! next send and without reordering. The stream ends at a terminal
//! event or at the idle deadline; clients reconnect with `?after_seq=N`
//! and continue from the last frame id they saw.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;

use cf_domain::ids::CorrelationId;
use cf_domain::progress::{ProgressEvent, ProgressKind};

use crate::api::api_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Resume after this sequence number (0 = from the start).
    #[serde(default)]
    pub after_seq: u64,
}

pub async fn stream(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let correlation_id: CorrelationId = match correlation_id.parse() {
        Ok(cid) => cid,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "malformed correlation_id"),
    };

    let deadline = Duration::from_secs(state.config.pipeline.stream_idle_timeout_secs);
    let events = match state
        .progress
        .read_from(correlation_id, query.after_seq, deadline)
        .await
    {
        Ok(events) => events,
        Err(e) => return api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };

    let frames = events.map(|event| {
        Ok::<_, Infallible>(match event {
            Ok(event) => frame(&event),
            Err(e) => Event::default()
                .event("error")
                .data(serde_json::json!({ "error": e.to_string() }).to_string()),
        })
    });

    Sse::new(frames)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// One progress event as one SSE frame. The frame id is the seq, which
/// is what reconnecting clients feed back through `after_seq`.
fn frame(event: &ProgressEvent) -> Event {
    Event::default()
        .id(event.seq.to_string())
        .event(event_name(event.kind))
        .data(event.payload.to_string())
}

fn event_name(kind: ProgressKind) -> &'static str {
    match kind {
        ProgressKind::Thinking => "thinking",
        ProgressKind::MessageChunk => "message",
        ProgressKind::Completed => "completed",
        ProgressKind::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_the_wire_contract() {
        assert_eq!(event_name(ProgressKind::Thinking), "thinking");
        assert_eq!(event_name(ProgressKind::MessageChunk), "message");
        assert_eq!(event_name(ProgressKind::Completed), "completed");
        assert_eq!(event_name(ProgressKind::Error), "error");
    }
}
