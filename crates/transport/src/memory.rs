//! Implementation A — single-process substrate.
//!
//! Bounded tokio mpsc queue, `parking_lot`-guarded maps for responses,
//! thread state, and history, and a per-correlation event vector with a
//! `Notify` for live readers. Nothing survives a restart; acceptable for
//! development and required for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::Notify;

use cf_domain::ids::{CorrelationId, ThreadId};
use cf_domain::message::{ResponseStatus, TurnRequest, TurnResponse};
use cf_domain::progress::{ProgressEvent, ProgressKind};
use cf_domain::stream::BoxStream;
use cf_domain::thread::{ThreadState, TranscriptEntry};
use cf_domain::{Error, Result};

use crate::ports::{
    DocumentAggregate, FeedbackEntry, HistoryStore, ProgressLog, RequestQueue, ResponseStore,
    SearchAggregate, ThreadStore, TurnSummary,
};

/// Fallback re-check interval for live readers. Bounds the window in
/// which a wakeup can be missed between snapshot and `Notify`
/// registration.
const LIVE_READ_TICK: Duration = Duration::from_millis(100);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Internal slots
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct LogSlot {
    events: Vec<ProgressEvent>,
    sealed: bool,
    notify: Arc<Notify>,
}

struct StoredResponse {
    response: TurnResponse,
    stored_at: Instant,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryTransport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Single-process implementation of all five substrate ports.
pub struct MemoryTransport {
    queue_tx: mpsc::Sender<TurnRequest>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<TurnRequest>>,
    logs: Arc<Mutex<HashMap<CorrelationId, LogSlot>>>,
    responses: RwLock<HashMap<CorrelationId, StoredResponse>>,
    threads: RwLock<HashMap<ThreadId, ThreadState>>,
    transcripts: RwLock<HashMap<ThreadId, Vec<TranscriptEntry>>>,
    turns: RwLock<Vec<TurnSummary>>,
    feedback: RwLock<Vec<FeedbackEntry>>,
    response_ttl: Duration,
}

impl MemoryTransport {
    pub fn new(queue_capacity: usize, response_ttl: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity.max(1));
        Self {
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            logs: Arc::new(Mutex::new(HashMap::new())),
            responses: RwLock::new(HashMap::new()),
            threads: RwLock::new(HashMap::new()),
            transcripts: RwLock::new(HashMap::new()),
            turns: RwLock::new(Vec::new()),
            feedback: RwLock::new(Vec::new()),
            response_ttl,
        }
    }

    /// Drop expired terminal responses. Called on every write.
    fn sweep_responses(&self) {
        let ttl = self.response_ttl;
        self.responses
            .write()
            .retain(|_, stored| stored.stored_at.elapsed() < ttl);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(256, Duration::from_secs(900))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RequestQueue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl RequestQueue for MemoryTransport {
    async fn publish(&self, request: TurnRequest) -> Result<()> {
        self.queue_tx
            .send(request)
            .await
            .map_err(|_| Error::Queue("request queue is closed".into()))
    }

    async fn consume(&self) -> Result<TurnRequest> {
        let mut rx = self.queue_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| Error::Queue("request queue is closed".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ResponseStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ResponseStore for MemoryTransport {
    async fn put(&self, response: TurnResponse) -> Result<()> {
        self.sweep_responses();
        let mut responses = self.responses.write();
        // First write wins.
        responses
            .entry(response.correlation_id)
            .or_insert(StoredResponse {
                response,
                stored_at: Instant::now(),
            });
        Ok(())
    }

    async fn get(&self, correlation_id: CorrelationId) -> Result<Option<TurnResponse>> {
        let responses = self.responses.read();
        Ok(responses
            .get(&correlation_id)
            .filter(|stored| stored.stored_at.elapsed() < self.response_ttl)
            .map(|stored| stored.response.clone()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProgressLog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ProgressLog for MemoryTransport {
    async fn append(
        &self,
        correlation_id: CorrelationId,
        kind: ProgressKind,
        payload: serde_json::Value,
    ) -> Result<u64> {
        let (seq, notify) = {
            let mut logs = self.logs.lock();
            let slot = logs.entry(correlation_id).or_default();
            if slot.sealed {
                return Err(Error::Store(format!(
                    "progress log for {correlation_id} is sealed by a terminal event"
                )));
            }
            let seq = slot.events.len() as u64 + 1;
            slot.events.push(ProgressEvent {
                seq,
                correlation_id,
                kind,
                payload,
                timestamp: Utc::now(),
            });
            if kind.is_terminal() {
                slot.sealed = true;
            }
            (seq, slot.notify.clone())
        };
        notify.notify_waiters();
        Ok(seq)
    }

    async fn read_from(
        &self,
        correlation_id: CorrelationId,
        after_seq: u64,
        deadline: Duration,
    ) -> Result<BoxStream<'static, Result<ProgressEvent>>> {
        let logs = self.logs.clone();
        let stream = async_stream::stream! {
            let mut cursor = after_seq;
            let deadline_at = tokio::time::Instant::now() + deadline;
            loop {
                let (pending, sealed, notify) = {
                    let mut map = logs.lock();
                    let slot = map.entry(correlation_id).or_default();
                    let pending: Vec<ProgressEvent> = slot
                        .events
                        .iter()
                        .filter(|e| e.seq > cursor)
                        .cloned()
                        .collect();
                    (pending, slot.sealed, slot.notify.clone())
                };

                if !pending.is_empty() {
                    for event in pending {
                        cursor = event.seq;
                        let terminal = event.is_terminal();
                        yield Ok(event);
                        if terminal {
                            return;
                        }
                    }
                    continue;
                }

                // The reader joined after the terminal event.
                if sealed {
                    return;
                }

                let now = tokio::time::Instant::now();
                if now >= deadline_at {
                    return;
                }
                let tick = LIVE_READ_TICK.min(deadline_at - now);
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(tick) => {}
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn read_snapshot(&self, correlation_id: CorrelationId) -> Result<Vec<ProgressEvent>> {
        let logs = self.logs.lock();
        Ok(logs
            .get(&correlation_id)
            .map(|slot| slot.events.clone())
            .unwrap_or_default())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ThreadStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ThreadStore for MemoryTransport {
    async fn load(&self, thread_id: ThreadId) -> Result<Option<ThreadState>> {
        Ok(self.threads.read().get(&thread_id).cloned())
    }

    async fn save(&self, mut state: ThreadState, expected_version: u64) -> Result<ThreadState> {
        let mut threads = self.threads.write();
        let stored_version = threads
            .get(&state.thread_id)
            .map(|s| s.version)
            .unwrap_or(0);
        if stored_version != expected_version {
            return Err(Error::StateConflict(format!(
                "thread {} is at version {stored_version}, expected {expected_version}",
                state.thread_id
            )));
        }
        state.version = expected_version + 1;
        threads.insert(state.thread_id, state.clone());
        Ok(state)
    }

    async fn append_transcript(
        &self,
        thread_id: ThreadId,
        entries: &[TranscriptEntry],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.transcripts
            .write()
            .entry(thread_id)
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    async fn transcript(&self, thread_id: ThreadId) -> Result<Vec<TranscriptEntry>> {
        Ok(self
            .transcripts
            .read()
            .get(&thread_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HistoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl HistoryStore for MemoryTransport {
    async fn record_turn(&self, summary: &TurnSummary) -> Result<()> {
        self.turns.write().push(summary.clone());
        Ok(())
    }

    async fn record_feedback(&self, feedback: &FeedbackEntry) -> Result<()> {
        self.feedback.write().push(feedback.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TurnSummary>> {
        let turns = self.turns.read();
        Ok(turns.iter().rev().take(limit).cloned().collect())
    }

    async fn most_helpful_searches(&self, limit: usize) -> Result<Vec<SearchAggregate>> {
        let votes = self.votes_by_correlation();
        let turns = self.turns.read();

        let mut by_query: HashMap<String, SearchAggregate> = HashMap::new();
        for turn in turns.iter().filter(|t| t.status == ResponseStatus::Completed) {
            let agg = by_query
                .entry(turn.question.clone())
                .or_insert_with(|| SearchAggregate {
                    query: turn.question.clone(),
                    turns: 0,
                    helpful_votes: 0,
                });
            agg.turns += 1;
            agg.helpful_votes += votes.get(&turn.correlation_id).copied().unwrap_or(0);
        }

        let mut aggregates: Vec<SearchAggregate> = by_query.into_values().collect();
        aggregates.sort_by(|a, b| {
            b.helpful_votes
                .cmp(&a.helpful_votes)
                .then(b.turns.cmp(&a.turns))
                .then(a.query.cmp(&b.query))
        });
        aggregates.truncate(limit);
        Ok(aggregates)
    }

    async fn most_helpful_documents(&self, limit: usize) -> Result<Vec<DocumentAggregate>> {
        let votes = self.votes_by_correlation();
        let turns = self.turns.read();

        let mut by_doc: HashMap<String, DocumentAggregate> = HashMap::new();
        for turn in turns.iter() {
            let turn_votes = votes.get(&turn.correlation_id).copied().unwrap_or(0);
            for source in &turn.sources {
                let agg = by_doc
                    .entry(source.document_id.clone())
                    .or_insert_with(|| DocumentAggregate {
                        document_id: source.document_id.clone(),
                        title: source.title.clone(),
                        citations: 0,
                        helpful_votes: 0,
                    });
                agg.citations += 1;
                agg.helpful_votes += turn_votes;
            }
        }

        let mut aggregates: Vec<DocumentAggregate> = by_doc.into_values().collect();
        aggregates.sort_by(|a, b| {
            b.helpful_votes
                .cmp(&a.helpful_votes)
                .then(b.citations.cmp(&a.citations))
                .then(a.document_id.cmp(&b.document_id))
        });
        aggregates.truncate(limit);
        Ok(aggregates)
    }
}

impl MemoryTransport {
    /// Net helpful votes per correlation id.
    fn votes_by_correlation(&self) -> HashMap<CorrelationId, i64> {
        let feedback = self.feedback.read();
        let mut votes: HashMap<CorrelationId, i64> = HashMap::new();
        for entry in feedback.iter() {
            *votes.entry(entry.correlation_id).or_insert(0) +=
                if entry.helpful { 1 } else { -1 };
        }
        votes
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
