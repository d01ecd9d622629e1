//! `GET /chat/history/*` — read-only projections over persisted turns
//! and per-turn feedback.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::api_error;
use crate::state::AppState;

const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_limit() -> usize {
    20
}

impl HistoryQuery {
    fn capped(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT)
    }
}

pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.history.recent(query.capped()).await {
        Ok(turns) => Json(serde_json::json!({ "turns": turns })).into_response(),
        Err(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub async fn most_helpful_searches(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.history.most_helpful_searches(query.capped()).await {
        Ok(searches) => Json(serde_json::json!({ "searches": searches })).into_response(),
        Err(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub async fn most_helpful_documents(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.history.most_helpful_documents(query.capped()).await {
        Ok(documents) => Json(serde_json::json!({ "documents": documents })).into_response(),
        Err(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_capped() {
        assert_eq!(HistoryQuery { limit: 0 }.capped(), 1);
        assert_eq!(HistoryQuery { limit: 20 }.capped(), 20);
        assert_eq!(HistoryQuery { limit: 10_000 }.capped(), MAX_LIMIT);
    }
}
