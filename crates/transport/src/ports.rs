//! Port traits consumed by the orchestrator and the Front API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cf_domain::ids::{CorrelationId, ThreadId};
use cf_domain::message::{ResponseStatus, SourceRef, TurnRequest, TurnResponse};
use cf_domain::progress::{ProgressEvent, ProgressKind};
use cf_domain::stream::BoxStream;
use cf_domain::thread::{ThreadState, TranscriptEntry};
use cf_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RequestQueue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Correlation-keyed request queue.
///
/// `consume` is pop-style: it blocks until a request is available and
/// transfers ownership to the caller. Delivery is at-most-once with no
/// redelivery: a worker that dies after popping loses the request, and
/// the client reissues.
#[async_trait::async_trait]
pub trait RequestQueue: Send + Sync {
    /// Enqueue one request. Fails with `Error::Queue` when the backing
    /// store is unreachable.
    async fn publish(&self, request: TurnRequest) -> Result<()>;

    /// Block until a request arrives and claim it.
    async fn consume(&self) -> Result<TurnRequest>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ResponseStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable response slot, one per correlation id.
#[async_trait::async_trait]
pub trait ResponseStore: Send + Sync {
    /// Idempotent write: a second `put` for the same correlation id is
    /// a no-op and the first response stays observable.
    async fn put(&self, response: TurnResponse) -> Result<()>;

    async fn get(&self, correlation_id: CorrelationId) -> Result<Option<TurnResponse>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProgressLog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered, per-correlation append-only event log readable as a live
/// feed.
#[async_trait::async_trait]
pub trait ProgressLog: Send + Sync {
    /// Atomically assign the next seq for the correlation id and
    /// append. Rejects appends after a terminal event.
    async fn append(
        &self,
        correlation_id: CorrelationId,
        kind: ProgressKind,
        payload: serde_json::Value,
    ) -> Result<u64>;

    /// Live read of events with `seq > after_seq`, in order. The stream
    /// ends after yielding a terminal event, or when `deadline` elapses
    /// with no further events.
    async fn read_from(
        &self,
        correlation_id: CorrelationId,
        after_seq: u64,
        deadline: Duration,
    ) -> Result<BoxStream<'static, Result<ProgressEvent>>>;

    /// Non-blocking snapshot of everything appended so far.
    async fn read_snapshot(&self, correlation_id: CorrelationId) -> Result<Vec<ProgressEvent>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ThreadStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-thread state and transcript, serialized per thread via optimistic
/// concurrency on `ThreadState::version`.
#[async_trait::async_trait]
pub trait ThreadStore: Send + Sync {
    async fn load(&self, thread_id: ThreadId) -> Result<Option<ThreadState>>;

    /// Persist `state` if the stored version still equals
    /// `expected_version` (0 for a thread never written). On success
    /// returns the stored state with its version bumped; on mismatch
    /// fails with `Error::StateConflict`.
    async fn save(&self, state: ThreadState, expected_version: u64) -> Result<ThreadState>;

    async fn append_transcript(
        &self,
        thread_id: ThreadId,
        entries: &[TranscriptEntry],
    ) -> Result<()>;

    async fn transcript(&self, thread_id: ThreadId) -> Result<Vec<TranscriptEntry>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HistoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One completed turn, as recorded for history projections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSummary {
    pub correlation_id: CorrelationId,
    pub thread_id: ThreadId,
    pub question: String,
    pub answer_preview: String,
    pub status: ResponseStatus,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// A helpful/not-helpful vote against one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub correlation_id: CorrelationId,
    pub helpful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Projection row: questions ranked by helpfulness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchAggregate {
    pub query: String,
    pub turns: u64,
    pub helpful_votes: i64,
}

/// Projection row: cited documents ranked by helpfulness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAggregate {
    pub document_id: String,
    pub title: String,
    pub citations: u64,
    pub helpful_votes: i64,
}

/// Read-only projections over persisted turns and per-turn feedback.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_turn(&self, summary: &TurnSummary) -> Result<()>;

    async fn record_feedback(&self, feedback: &FeedbackEntry) -> Result<()>;

    /// Most recent completed turns, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<TurnSummary>>;

    /// Questions ranked by net helpful votes, then by frequency.
    async fn most_helpful_searches(&self, limit: usize) -> Result<Vec<SearchAggregate>>;

    /// Cited documents ranked by net helpful votes, then by citation
    /// count.
    async fn most_helpful_documents(&self, limit: usize) -> Result<Vec<DocumentAggregate>>;
}
