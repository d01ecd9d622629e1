//! Implementation B — relational substrate on SQLite via sqlx.
//!
//! The queue is a claim-and-delete row pop with a polling loop (list
//! semantics, blocking pop). Responses live in a TTL'd table. Progress
//! events are an append-only table with a `(correlation_id, seq)`
//! primary key; seq assignment happens inside a transaction and live
//! reads poll the table at a tight interval until a terminal row or the
//! caller's deadline.
//!
//! Every backend failure maps to `Error::Queue`/`Error::Store` and
//! surfaces to the caller. Nothing falls back to process memory.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use cf_domain::ids::{CorrelationId, ThreadId};
use cf_domain::message::{ResponseStatus, SourceRef, TurnRequest, TurnResponse};
use cf_domain::progress::{ProgressEvent, ProgressKind};
use cf_domain::stream::BoxStream;
use cf_domain::thread::{ThreadState, TranscriptEntry};
use cf_domain::{Error, Result};

use crate::ports::{
    DocumentAggregate, FeedbackEntry, HistoryStore, ProgressLog, RequestQueue, ResponseStore,
    SearchAggregate, ThreadStore, TurnSummary,
};

/// Attempts for the seq-assignment transaction before giving up on a
/// persistent write conflict.
const APPEND_ATTEMPTS: u32 = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RelationalTransport {
    pool: SqlitePool,
    poll_interval: Duration,
    response_ttl: Duration,
}

impl RelationalTransport {
    /// Connect to `database_url` (e.g. `sqlite://careflow.db`) and
    /// create the schema when missing.
    pub async fn connect(
        database_url: &str,
        poll_interval: Duration,
        response_ttl: Duration,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Store(format!("bad database url: {e}")))?
            .create_if_missing(true);

        // An in-memory database exists per connection; pool it down to
        // one so every handle sees the same data.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let transport = Self {
            pool,
            poll_interval,
            response_ttl,
        };
        transport.init_schema().await?;
        tracing::info!(url = database_url, "relational transport ready");
        Ok(transport)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS request_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                correlation_id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS responses (
                correlation_id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS progress_events (
                correlation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (correlation_id, seq)
            )",
            "CREATE TABLE IF NOT EXISTS threads (
                thread_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                state TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS transcript_entries (
                thread_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                entry TEXT NOT NULL,
                PRIMARY KEY (thread_id, idx)
            )",
            "CREATE TABLE IF NOT EXISTS turn_history (
                correlation_id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer_preview TEXT NOT NULL,
                status TEXT NOT NULL,
                model_used TEXT,
                completed_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS turn_sources (
                correlation_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT,
                score REAL NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS turn_feedback (
                correlation_id TEXT NOT NULL,
                helpful INTEGER NOT NULL,
                comment TEXT,
                created_at TEXT NOT NULL
            )",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    /// Test hook: a fresh in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(
            "sqlite::memory:",
            Duration::from_millis(10),
            Duration::from_secs(900),
        )
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RequestQueue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl RequestQueue for RelationalTransport {
    async fn publish(&self, request: TurnRequest) -> Result<()> {
        let payload = serde_json::to_string(&request)?;
        sqlx::query(
            "INSERT INTO request_queue (correlation_id, payload, submitted_at) VALUES (?, ?, ?)",
        )
        .bind(request.correlation_id.to_string())
        .bind(payload)
        .bind(request.submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(())
    }

    async fn consume(&self) -> Result<TurnRequest> {
        loop {
            // Claim-and-delete: the DELETE's row count decides the race
            // when several consumers pick the same head row.
            let head = sqlx::query("SELECT id, payload FROM request_queue ORDER BY id LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(queue_err)?;

            if let Some(row) = head {
                let id: i64 = row.get("id");
                let payload: String = row.get("payload");
                let claimed = sqlx::query("DELETE FROM request_queue WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(queue_err)?;
                if claimed.rows_affected() == 1 {
                    return Ok(serde_json::from_str(&payload)?);
                }
                // Another consumer won; try the next head immediately.
                tracing::trace!(id, "lost queue claim race");
                continue;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ResponseStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ResponseStore for RelationalTransport {
    async fn put(&self, response: TurnResponse) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query("DELETE FROM responses WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        let body = serde_json::to_string(&response)?;
        let expires_at = now + self.response_ttl.as_secs() as i64;
        // First write wins.
        sqlx::query(
            "INSERT INTO responses (correlation_id, body, expires_at) VALUES (?, ?, ?)
             ON CONFLICT (correlation_id) DO NOTHING",
        )
        .bind(response.correlation_id.to_string())
        .bind(body)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, correlation_id: CorrelationId) -> Result<Option<TurnResponse>> {
        let row = sqlx::query_as::<_, (String, i64)>(
            "SELECT body, expires_at FROM responses WHERE correlation_id = ?",
        )
        .bind(correlation_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some((body, expires_at)) if expires_at >= Utc::now().timestamp() => {
                Ok(Some(serde_json::from_str(&body)?))
            }
            _ => Ok(None),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProgressLog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ProgressLog for RelationalTransport {
    async fn append(
        &self,
        correlation_id: CorrelationId,
        kind: ProgressKind,
        payload: serde_json::Value,
    ) -> Result<u64> {
        let cid = correlation_id.to_string();
        let payload = payload.to_string();
        let mut last_err = None;

        for _ in 0..APPEND_ATTEMPTS {
            let mut tx = self.pool.begin().await.map_err(store_err)?;

            let last_kind = sqlx::query_as::<_, (String,)>(
                "SELECT kind FROM progress_events WHERE correlation_id = ?
                 ORDER BY seq DESC LIMIT 1",
            )
            .bind(&cid)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;

            if let Some((kind_str,)) = &last_kind {
                if kind_from_str(kind_str)?.is_terminal() {
                    return Err(Error::Store(format!(
                        "progress log for {correlation_id} is sealed by a terminal event"
                    )));
                }
            }

            let (next_seq,): (i64,) = sqlx::query_as(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM progress_events WHERE correlation_id = ?",
            )
            .bind(&cid)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err)?;

            let inserted = sqlx::query(
                "INSERT INTO progress_events (correlation_id, seq, kind, payload, timestamp)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&cid)
            .bind(next_seq)
            .bind(kind_to_str(kind))
            .bind(&payload)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {
                    tx.commit().await.map_err(store_err)?;
                    return Ok(next_seq as u64);
                }
                Err(e) => {
                    // A concurrent appender took this seq; retry on a
                    // fresh transaction.
                    last_err = Some(store_err(e));
                    let _ = tx.rollback().await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Store(format!("progress append contention for {correlation_id}"))
        }))
    }

    async fn read_from(
        &self,
        correlation_id: CorrelationId,
        after_seq: u64,
        deadline: Duration,
    ) -> Result<BoxStream<'static, Result<ProgressEvent>>> {
        let pool = self.pool.clone();
        let poll_interval = self.poll_interval;
        let stream = async_stream::stream! {
            let mut cursor = after_seq as i64;
            let deadline_at = tokio::time::Instant::now() + deadline;
            loop {
                let rows = fetch_events_after(&pool, correlation_id, cursor).await;
                let rows = match rows {
                    Ok(rows) => rows,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                if rows.is_empty() {
                    // Terminal already observed by an earlier reader?
                    match log_sealed_at_or_before(&pool, correlation_id, cursor).await {
                        Ok(true) => return,
                        Ok(false) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                    let now = tokio::time::Instant::now();
                    if now >= deadline_at {
                        return;
                    }
                    tokio::time::sleep(poll_interval.min(deadline_at - now)).await;
                    continue;
                }

                for event in rows {
                    cursor = event.seq as i64;
                    let terminal = event.is_terminal();
                    yield Ok(event);
                    if terminal {
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn read_snapshot(&self, correlation_id: CorrelationId) -> Result<Vec<ProgressEvent>> {
        fetch_events_after(&self.pool, correlation_id, 0).await
    }
}

/// Events with `seq > cursor`, in order.
async fn fetch_events_after(
    pool: &SqlitePool,
    correlation_id: CorrelationId,
    cursor: i64,
) -> Result<Vec<ProgressEvent>> {
    let rows = sqlx::query_as::<_, (i64, String, String, String)>(
        "SELECT seq, kind, payload, timestamp FROM progress_events
         WHERE correlation_id = ? AND seq > ? ORDER BY seq",
    )
    .bind(correlation_id.to_string())
    .bind(cursor)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;

    rows.into_iter()
        .map(|(seq, kind, payload, timestamp)| {
            Ok(ProgressEvent {
                seq: seq as u64,
                correlation_id,
                kind: kind_from_str(&kind)?,
                payload: serde_json::from_str(&payload)?,
                timestamp: parse_timestamp(&timestamp)?,
            })
        })
        .collect()
}

/// Whether the log holds a terminal event at or before `cursor` (the
/// reader joined after the feed closed).
async fn log_sealed_at_or_before(
    pool: &SqlitePool,
    correlation_id: CorrelationId,
    cursor: i64,
) -> Result<bool> {
    let row = sqlx::query_as::<_, (String,)>(
        "SELECT kind FROM progress_events WHERE correlation_id = ? AND seq <= ?
         ORDER BY seq DESC LIMIT 1",
    )
    .bind(correlation_id.to_string())
    .bind(cursor)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;

    match row {
        Some((kind,)) => Ok(kind_from_str(&kind)?.is_terminal()),
        None => Ok(false),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ThreadStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ThreadStore for RelationalTransport {
    async fn load(&self, thread_id: ThreadId) -> Result<Option<ThreadState>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT state FROM threads WHERE thread_id = ?",
        )
        .bind(thread_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some((state,)) => Ok(Some(serde_json::from_str(&state)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, mut state: ThreadState, expected_version: u64) -> Result<ThreadState> {
        state.version = expected_version + 1;
        let body = serde_json::to_string(&state)?;
        let tid = state.thread_id.to_string();

        let outcome = if expected_version == 0 {
            sqlx::query(
                "INSERT INTO threads (thread_id, version, state) VALUES (?, ?, ?)
                 ON CONFLICT (thread_id) DO NOTHING",
            )
            .bind(&tid)
            .bind(state.version as i64)
            .bind(&body)
            .execute(&self.pool)
            .await
            .map_err(store_err)?
        } else {
            sqlx::query("UPDATE threads SET version = ?, state = ? WHERE thread_id = ? AND version = ?")
                .bind(state.version as i64)
                .bind(&body)
                .bind(&tid)
                .bind(expected_version as i64)
                .execute(&self.pool)
                .await
                .map_err(store_err)?
        };

        if outcome.rows_affected() != 1 {
            return Err(Error::StateConflict(format!(
                "thread {tid} moved past version {expected_version}"
            )));
        }
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
        let tid = thread_id.to_string();
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let (mut idx,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(idx), 0) FROM transcript_entries WHERE thread_id = ?",
        )
        .bind(&tid)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        for entry in entries {
            idx += 1;
            sqlx::query("INSERT INTO transcript_entries (thread_id, idx, entry) VALUES (?, ?, ?)")
                .bind(&tid)
                .bind(idx)
                .bind(serde_json::to_string(entry)?)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)
    }

    async fn transcript(&self, thread_id: ThreadId) -> Result<Vec<TranscriptEntry>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT entry FROM transcript_entries WHERE thread_id = ? ORDER BY idx",
        )
        .bind(thread_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|(entry,)| Ok(serde_json::from_str(&entry)?))
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HistoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl HistoryStore for RelationalTransport {
    async fn record_turn(&self, summary: &TurnSummary) -> Result<()> {
        let cid = summary.correlation_id.to_string();
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query(
            "INSERT INTO turn_history
             (correlation_id, thread_id, question, answer_preview, status, model_used, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (correlation_id) DO NOTHING",
        )
        .bind(&cid)
        .bind(summary.thread_id.to_string())
        .bind(&summary.question)
        .bind(&summary.answer_preview)
        .bind(status_to_str(summary.status))
        .bind(summary.model_used.as_deref())
        .bind(summary.completed_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        for source in &summary.sources {
            sqlx::query(
                "INSERT INTO turn_sources (correlation_id, document_id, title, url, score)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&cid)
            .bind(&source.document_id)
            .bind(&source.title)
            .bind(source.url.as_deref())
            .bind(source.score as f64)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)
    }

    async fn record_feedback(&self, feedback: &FeedbackEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO turn_feedback (correlation_id, helpful, comment, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(feedback.correlation_id.to_string())
        .bind(feedback.helpful as i64)
        .bind(feedback.comment.as_deref())
        .bind(feedback.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TurnSummary>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, Option<String>, String)>(
            "SELECT correlation_id, thread_id, question, answer_preview, status, model_used, completed_at
             FROM turn_history ORDER BY completed_at DESC, correlation_id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for (cid, tid, question, answer_preview, status, model_used, completed_at) in rows {
            let correlation_id = parse_cid(&cid)?;
            let sources = self.sources_for(&cid).await?;
            summaries.push(TurnSummary {
                correlation_id,
                thread_id: tid
                    .parse()
                    .map_err(|e| Error::Store(format!("bad thread id in history: {e}")))?,
                question,
                answer_preview,
                status: status_from_str(&status)?,
                sources,
                model_used,
                completed_at: parse_timestamp(&completed_at)?,
            });
        }
        Ok(summaries)
    }

    async fn most_helpful_searches(&self, limit: usize) -> Result<Vec<SearchAggregate>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT h.question,
                    COUNT(DISTINCT h.correlation_id) AS turns,
                    COALESCE(SUM(CASE f.helpful WHEN 1 THEN 1 WHEN 0 THEN -1 END), 0) AS votes
             FROM turn_history h
             LEFT JOIN turn_feedback f ON f.correlation_id = h.correlation_id
             WHERE h.status = 'completed'
             GROUP BY h.question
             ORDER BY votes DESC, turns DESC, h.question
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|(query, turns, helpful_votes)| SearchAggregate {
                query,
                turns: turns as u64,
                helpful_votes,
            })
            .collect())
    }

    async fn most_helpful_documents(&self, limit: usize) -> Result<Vec<DocumentAggregate>> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64)>(
            "SELECT s.document_id, s.title,
                    COUNT(*) AS citations,
                    COALESCE(SUM(CASE f.helpful WHEN 1 THEN 1 WHEN 0 THEN -1 END), 0) AS votes
             FROM turn_sources s
             LEFT JOIN turn_feedback f ON f.correlation_id = s.correlation_id
             GROUP BY s.document_id, s.title
             ORDER BY votes DESC, citations DESC, s.document_id
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|(document_id, title, citations, helpful_votes)| DocumentAggregate {
                document_id,
                title,
                citations: citations as u64,
                helpful_votes,
            })
            .collect())
    }
}

impl RelationalTransport {
    async fn sources_for(&self, correlation_id: &str) -> Result<Vec<SourceRef>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, f64)>(
            "SELECT document_id, title, url, score FROM turn_sources
             WHERE correlation_id = ? ORDER BY score DESC",
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|(document_id, title, url, score)| SourceRef {
                document_id,
                title,
                url,
                score: score as f32,
            })
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Column codecs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn store_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

fn queue_err(e: sqlx::Error) -> Error {
    Error::Queue(e.to_string())
}

fn kind_to_str(kind: ProgressKind) -> &'static str {
    match kind {
        ProgressKind::Thinking => "thinking",
        ProgressKind::MessageChunk => "message_chunk",
        ProgressKind::Completed => "completed",
        ProgressKind::Error => "error",
    }
}

fn kind_from_str(s: &str) -> Result<ProgressKind> {
    match s {
        "thinking" => Ok(ProgressKind::Thinking),
        "message_chunk" => Ok(ProgressKind::MessageChunk),
        "completed" => Ok(ProgressKind::Completed),
        "error" => Ok(ProgressKind::Error),
        other => Err(Error::Store(format!("unknown progress kind: {other}"))),
    }
}

fn status_to_str(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Completed => "completed",
        ResponseStatus::Clarification => "clarification",
        ResponseStatus::RefinementAsk => "refinement_ask",
        ResponseStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> Result<ResponseStatus> {
    match s {
        "completed" => Ok(ResponseStatus::Completed),
        "clarification" => Ok(ResponseStatus::Clarification),
        "refinement_ask" => Ok(ResponseStatus::RefinementAsk),
        "failed" => Ok(ResponseStatus::Failed),
        other => Err(Error::Store(format!("unknown response status: {other}"))),
    }
}

fn parse_cid(s: &str) -> Result<CorrelationId> {
    s.parse()
        .map_err(|e| Error::Store(format!("bad correlation id in store: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("bad timestamp in store: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn queue_round_trip() {
        let t = RelationalTransport::in_memory().await.unwrap();
        let req = TurnRequest::new("what is prior authorization", ThreadId::mint());
        t.publish(req.clone()).await.unwrap();

        let popped = t.consume().await.unwrap();
        assert_eq!(popped.correlation_id, req.correlation_id);
        assert_eq!(popped.message, req.message);
    }

    #[tokio::test]
    async fn response_put_is_idempotent() {
        let t = RelationalTransport::in_memory().await.unwrap();
        let cid = CorrelationId::mint();
        let tid = ThreadId::mint();

        let mut first = TurnResponse::failed(cid, tid, "first");
        first.message = "first".into();
        let mut second = TurnResponse::failed(cid, tid, "second");
        second.message = "second".into();

        t.put(first).await.unwrap();
        t.put(second).await.unwrap();

        assert_eq!(t.get(cid).await.unwrap().unwrap().message, "first");
    }

    #[tokio::test]
    async fn progress_seqs_are_dense_and_sealed() {
        let t = RelationalTransport::in_memory().await.unwrap();
        let cid = CorrelationId::mint();

        assert_eq!(
            t.append(cid, ProgressKind::Thinking, serde_json::json!({"text": "a"}))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            t.append(cid, ProgressKind::Completed, serde_json::json!({}))
                .await
                .unwrap(),
            2
        );

        let err = t
            .append(cid, ProgressKind::Thinking, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        let snapshot = t.read_snapshot(cid).await.unwrap();
        assert_eq!(
            snapshot.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn live_read_polls_to_terminal() {
        let t = std::sync::Arc::new(RelationalTransport::in_memory().await.unwrap());
        let cid = CorrelationId::mint();

        let reader = t.clone();
        let handle = tokio::spawn(async move {
            let mut stream = reader
                .read_from(cid, 0, Duration::from_secs(5))
                .await
                .unwrap();
            let mut seqs = Vec::new();
            while let Some(ev) = stream.next().await {
                seqs.push(ev.unwrap().seq);
            }
            seqs
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        t.append(cid, ProgressKind::Thinking, serde_json::json!({"text": "x"}))
            .await
            .unwrap();
        t.append(cid, ProgressKind::Completed, serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(handle.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn thread_version_check() {
        let t = RelationalTransport::in_memory().await.unwrap();
        let tid = ThreadId::mint();
        let state = ThreadState::new(tid);

        let stored = t.save(state.clone(), 0).await.unwrap();
        assert_eq!(stored.version, 1);

        let err = t.save(state, 0).await.unwrap_err();
        assert!(matches!(err, Error::StateConflict(_)));

        let loaded = t.load(tid).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn transcript_order_survives_round_trip() {
        use cf_domain::message::Role;

        let t = RelationalTransport::in_memory().await.unwrap();
        let tid = ThreadId::mint();
        t.append_transcript(
            tid,
            &[
                TranscriptEntry::now(Role::User, "q1"),
                TranscriptEntry::now(Role::Assistant, "a1"),
            ],
        )
        .await
        .unwrap();
        t.append_transcript(tid, &[TranscriptEntry::now(Role::User, "q2")])
            .await
            .unwrap();

        let entries = t.transcript(tid).await.unwrap();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2"]);
    }

    #[tokio::test]
    async fn disk_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/careflow.db", dir.path().display());

        let cid = CorrelationId::mint();
        {
            let t = RelationalTransport::connect(
                &url,
                Duration::from_millis(10),
                Duration::from_secs(900),
            )
            .await
            .unwrap();
            t.put(TurnResponse::failed(cid, ThreadId::mint(), "diag"))
                .await
                .unwrap();
            t.append(cid, ProgressKind::Completed, serde_json::json!({}))
                .await
                .unwrap();
        }

        // A fresh connection sees the same rows.
        let t = RelationalTransport::connect(
            &url,
            Duration::from_millis(10),
            Duration::from_secs(900),
        )
        .await
        .unwrap();
        assert!(t.get(cid).await.unwrap().is_some());
        assert_eq!(t.read_snapshot(cid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_aggregates() {
        let t = RelationalTransport::in_memory().await.unwrap();
        let cid = CorrelationId::mint();
        t.record_turn(&TurnSummary {
            correlation_id: cid,
            thread_id: ThreadId::mint(),
            question: "appeals process".into(),
            answer_preview: "…".into(),
            status: ResponseStatus::Completed,
            sources: vec![SourceRef {
                document_id: "doc-1".into(),
                title: "Appeals SOP".into(),
                url: None,
                score: 0.8,
            }],
            model_used: Some("gpt-4o".into()),
            completed_at: Utc::now(),
        })
        .await
        .unwrap();

        t.record_feedback(&FeedbackEntry {
            correlation_id: cid,
            helpful: true,
            comment: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let searches = t.most_helpful_searches(5).await.unwrap();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].helpful_votes, 1);

        let docs = t.most_helpful_documents(5).await.unwrap();
        assert_eq!(docs[0].document_id, "doc-1");
        assert_eq!(docs[0].citations, 1);

        let recent = t.recent(5).await.unwrap();
        assert_eq!(recent[0].sources.len(), 1);
        assert_eq!(recent[0].model_used.as_deref(), Some("gpt-4o"));
    }
}
