//! Typed progress emission with two sinks.
//!
//! Every emitted line goes to the technical sink (the turn's tracing
//! span) and to the user-facing sink (the progress log read by the live
//! stream). `thinking` and `message_chunk` appends are best-effort: a
//! log failure is recorded and the stage continues. Terminal appends
//! are strict — their failure aborts the turn.

use std::sync::Arc;

use parking_lot::Mutex;

use cf_domain::ids::CorrelationId;
use cf_domain::progress::{ProgressEvent, ProgressKind};
use cf_domain::Result;
use cf_transport::ProgressLog;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stages and their user-facing lines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Classify,
    Plan,
    Clarify,
    Resolve,
    Integrate,
    Publish,
}

/// Static mapping from pipeline stage to the line shown in the client's
/// progress display.
pub fn stage_line(stage: Stage) -> &'static str {
    match stage {
        Stage::Load => "Loading conversation context",
        Stage::Classify => "Understanding your question",
        Stage::Plan => "Plan ready",
        Stage::Clarify => "Need one more detail before answering",
        Stage::Resolve => "Searching policy sources",
        Stage::Integrate => "Drafting the answer",
        Stage::Publish => "Finalizing",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Emitter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProgressEmitter {
    progress: Arc<dyn ProgressLog>,
    correlation_id: CorrelationId,
    /// Every thinking line emitted this turn; ships in the response's
    /// `thinking_log`.
    lines: Mutex<Vec<String>>,
}

impl ProgressEmitter {
    pub fn new(progress: Arc<dyn ProgressLog>, correlation_id: CorrelationId) -> Self {
        Self {
            progress,
            correlation_id,
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Emit the banner line for a stage.
    pub async fn stage(&self, stage: Stage) {
        self.thinking(stage_line(stage)).await;
    }

    /// Emit a `thinking` line. Best-effort.
    pub async fn thinking(&self, text: &str) {
        tracing::debug!(correlation_id = %self.correlation_id, "{text}");
        self.lines.lock().push(text.to_string());
        if let Err(e) = self
            .progress
            .append(
                self.correlation_id,
                ProgressKind::Thinking,
                ProgressEvent::thinking_payload(text),
            )
            .await
        {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                error = %e,
                "dropping thinking event"
            );
        }
    }

    /// Relay one streamed answer chunk. Best-effort.
    pub async fn chunk(&self, delta: &str) {
        if let Err(e) = self
            .progress
            .append(
                self.correlation_id,
                ProgressKind::MessageChunk,
                ProgressEvent::chunk_payload(delta),
            )
            .await
        {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                error = %e,
                "dropping message chunk"
            );
        }
    }

    /// Append the terminal `completed` event. Strict: a failure here is
    /// a turn-level inconsistency the caller must surface.
    pub async fn completed(&self, payload: serde_json::Value) -> Result<u64> {
        self.progress
            .append(self.correlation_id, ProgressKind::Completed, payload)
            .await
    }

    /// Append the terminal `error` event. Strict.
    pub async fn error(&self, payload: serde_json::Value) -> Result<u64> {
        self.progress
            .append(self.correlation_id, ProgressKind::Error, payload)
            .await
    }

    /// All thinking lines emitted so far, in order.
    pub fn log_lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}
