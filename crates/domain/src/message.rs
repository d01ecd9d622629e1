//! The correlated request/response pair and the LLM chat message shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blueprint::Clarification;
use crate::ids::{CorrelationId, ThreadId};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnRequest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One submitted user message, written once by the Front API and consumed
/// once by a single worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub correlation_id: CorrelationId,
    pub thread_id: ThreadId,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
    /// Bearer identity passed through from the client, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>, thread_id: ThreadId) -> Self {
        Self {
            correlation_id: CorrelationId::mint(),
            thread_id,
            message: message.into(),
            submitted_at: Utc::now(),
            actor_id: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnResponse
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Terminal outcome of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    Clarification,
    RefinementAsk,
    Failed,
}

impl ResponseStatus {
    /// Clarification-style statuses carry open slots instead of an answer.
    pub fn is_ask(self) -> bool {
        matches!(self, Self::Clarification | Self::RefinementAsk)
    }
}

/// A ranked, cited source backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub score: f32,
}

/// The durable response for one correlation id.
///
/// Written at most once; immutable once written. `message` holds the
/// serialized answer card for `Completed` turns (or prose when card
/// rendering fell back), the clarification prompt text for ask statuses,
/// and a short diagnostic for `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub correlation_id: CorrelationId,
    pub thread_id: ThreadId,
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    /// Per-source confidence scores, aligned with `sources`.
    #[serde(default)]
    pub source_confidence_strip: Vec<f32>,
    #[serde(default)]
    pub thinking_log: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured ask payload when `status` is clarification-like.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<Clarification>,
}

impl TurnResponse {
    /// A `Failed` response with a short diagnostic.
    pub fn failed(
        correlation_id: CorrelationId,
        thread_id: ThreadId,
        diagnostic: impl Into<String>,
    ) -> Self {
        let diagnostic = diagnostic.into();
        Self {
            correlation_id,
            thread_id,
            status: ResponseStatus::Failed,
            message: "The assistant could not produce an answer for this question.".into(),
            sources: Vec::new(),
            source_confidence_strip: Vec::new(),
            thinking_log: Vec::new(),
            model_used: None,
            error: Some(diagnostic),
            clarification: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat messages (LLM port shape)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ResponseStatus::RefinementAsk).unwrap(),
            "\"refinement_ask\""
        );
        assert_eq!(
            serde_json::to_string(&ResponseStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn ask_statuses() {
        assert!(ResponseStatus::Clarification.is_ask());
        assert!(ResponseStatus::RefinementAsk.is_ask());
        assert!(!ResponseStatus::Completed.is_ask());
        assert!(!ResponseStatus::Failed.is_ask());
    }

    #[test]
    fn failed_response_carries_diagnostic() {
        let req = TurnRequest::new("q", ThreadId::mint());
        let resp = TurnResponse::failed(req.correlation_id, req.thread_id, "llm exhausted");
        assert_eq!(resp.status, ResponseStatus::Failed);
        assert_eq!(resp.error.as_deref(), Some("llm exhausted"));
        assert!(resp.sources.is_empty());
    }

    #[test]
    fn request_round_trip() {
        let req = TurnRequest::new("what is prior authorization", ThreadId::mint());
        let json = serde_json::to_string(&req).unwrap();
        let back: TurnRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.correlation_id, req.correlation_id);
        assert_eq!(back.message, req.message);
        assert!(back.actor_id.is_none());
    }
}
