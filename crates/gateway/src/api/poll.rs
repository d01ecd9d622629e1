//! `GET /chat/response/:correlation_id` — the poll fallback.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use cf_domain::ids::CorrelationId;
use cf_domain::message::TurnResponse;

use crate::api::api_error;
use crate::state::AppState;

pub async fn poll(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Response {
    let correlation_id: CorrelationId = match correlation_id.parse() {
        Ok(cid) => cid,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "malformed correlation_id"),
    };

    match state.responses.get(correlation_id).await {
        Ok(Some(response)) => Json(response_body(&response)).into_response(),
        Ok(None) => {
            // No terminal response yet; surface the progress so far.
            let thinking_log = match state.progress.read_snapshot(correlation_id).await {
                Ok(events) => events
                    .iter()
                    .filter_map(|e| e.payload["text"].as_str().map(String::from))
                    .collect(),
                Err(_) => Vec::new(),
            };
            Json(serde_json::json!({
                "status": "pending",
                "thinking_log": thinking_log,
            }))
            .into_response()
        }
        Err(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// The poll response body. The terminal `completed`/`error` progress
/// event carries exactly this object as its payload, so stream and poll
/// clients see one shape.
pub fn response_body(response: &TurnResponse) -> serde_json::Value {
    let mut body = serde_json::json!({
        "status": response.status,
        "message": response.message,
        "thinking_log": response.thinking_log,
        "sources": response.sources,
        "source_confidence_strip": response.source_confidence_strip,
        "thread_id": response.thread_id,
    });
    if let Some(model) = &response.model_used {
        body["model_used"] = serde_json::json!(model);
    }
    if let Some(error) = &response.error {
        body["llm_error"] = serde_json::json!(error);
    }
    if let Some(clarification) = &response.clarification {
        body["open_slots"] = serde_json::json!(clarification.open_slots);
        body["clarification_options"] = serde_json::json!(clarification.options);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::blueprint::{Clarification, ClarificationOption};
    use cf_domain::ids::ThreadId;
    use cf_domain::message::ResponseStatus;

    #[test]
    fn completed_body_shape() {
        let mut response =
            TurnResponse::failed(CorrelationId::mint(), ThreadId::mint(), "diag");
        response.status = ResponseStatus::Completed;
        response.error = None;
        response.message = "{\"mode\":\"FACTUAL\"}".into();
        response.model_used = Some("gpt-4o".into());

        let body = response_body(&response);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["model_used"], "gpt-4o");
        assert!(body.get("llm_error").is_none());
        assert!(body.get("open_slots").is_none());
    }

    #[test]
    fn clarification_body_carries_slots() {
        let mut response = TurnResponse::failed(CorrelationId::mint(), ThreadId::mint(), "x");
        response.status = ResponseStatus::Clarification;
        response.error = None;
        response.clarification = Some(Clarification {
            open_slots: vec!["payer".into()],
            options: vec![ClarificationOption {
                slot: "payer".into(),
                label: "Which payer?".into(),
                choices: Vec::new(),
            }],
        });

        let body = response_body(&response);
        assert_eq!(body["status"], "clarification");
        assert_eq!(body["open_slots"][0], "payer");
        assert_eq!(body["clarification_options"][0]["slot"], "payer");
    }

    #[test]
    fn failed_body_carries_diagnostic() {
        let response = TurnResponse::failed(CorrelationId::mint(), ThreadId::mint(), "llm down");
        let body = response_body(&response);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["llm_error"], "llm down");
    }
}
