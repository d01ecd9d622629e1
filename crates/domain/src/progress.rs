//! The per-correlation progress feed.
//!
//! Every turn appends an ordered sequence of progress events to the log:
//! human-readable `thinking` lines for each pipeline stage, streamed
//! `message_chunk` text during answer integration, and exactly one
//! terminal event (`completed` or `error`) that closes the feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CorrelationId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event kind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Thinking,
    MessageChunk,
    Completed,
    Error,
}

impl ProgressKind {
    /// Terminal kinds close the feed; no later event with the same
    /// correlation id is valid.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One append-only record in the per-correlation feed.
///
/// `seq` is assigned by the log: dense, starting at 1, strictly
/// increasing per correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub seq: u64,
    pub correlation_id: CorrelationId,
    pub kind: ProgressKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Payload helper for `thinking` events: `{"text": ...}`.
    pub fn thinking_payload(text: &str) -> serde_json::Value {
        serde_json::json!({ "text": text })
    }

    /// Payload helper for `message_chunk` events: `{"delta": ...}`.
    pub fn chunk_payload(delta: &str) -> serde_json::Value {
        serde_json::json!({ "delta": delta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kinds() {
        assert!(ProgressKind::Completed.is_terminal());
        assert!(ProgressKind::Error.is_terminal());
        assert!(!ProgressKind::Thinking.is_terminal());
        assert!(!ProgressKind::MessageChunk.is_terminal());
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProgressKind::MessageChunk).unwrap(),
            "\"message_chunk\""
        );
    }

    #[test]
    fn event_round_trip() {
        let ev = ProgressEvent {
            seq: 3,
            correlation_id: CorrelationId::mint(),
            kind: ProgressKind::Thinking,
            payload: ProgressEvent::thinking_payload("Plan ready"),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, 3);
        assert_eq!(back.kind, ProgressKind::Thinking);
        assert_eq!(back.payload["text"], "Plan ready");
    }
}
