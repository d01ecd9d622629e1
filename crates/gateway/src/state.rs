use std::sync::Arc;
use std::time::Duration;

use cf_domain::config::{Config, QueueBackend, StoreBackend};
use cf_domain::{Error, Result};
use cf_providers::LlmProvider;
use cf_retrieval::Retriever;
use cf_transport::{
    HistoryStore, MemoryTransport, ProgressLog, RelationalTransport, RequestQueue, ResponseStore,
    ThreadStore,
};

use crate::runtime::thread_gate::ThreadGate;

/// Shared application state passed to all API handlers and workers.
///
/// Fields are grouped by concern:
/// - **Substrate** — queue, response slots, progress log, thread state,
///   history (any mix of memory/relational per config)
/// - **Collaborators** — the LLM and Retriever ports
/// - **Coordination** — the per-thread submission gate
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Substrate ─────────────────────────────────────────────────
    pub queue: Arc<dyn RequestQueue>,
    pub responses: Arc<dyn ResponseStore>,
    pub progress: Arc<dyn ProgressLog>,
    pub threads: Arc<dyn ThreadStore>,
    pub history: Arc<dyn HistoryStore>,

    // ── External collaborators ────────────────────────────────────
    pub llm: Arc<dyn LlmProvider>,
    pub retriever: Arc<dyn Retriever>,

    // ── Coordination ──────────────────────────────────────────────
    pub gate: Arc<ThreadGate>,
}

impl AppState {
    /// Wire up the substrate per the configured backends and assemble
    /// the state. A relational backend that cannot be reached is a hard
    /// startup error, never a fallback to memory.
    pub async fn build(
        config: Arc<Config>,
        llm: Arc<dyn LlmProvider>,
        retriever: Arc<dyn Retriever>,
    ) -> Result<Self> {
        let response_ttl = Duration::from_secs(config.transport.response_ttl_secs);
        let needs_relational = config.transport.store_backend == StoreBackend::Relational
            || config.transport.queue_backend == QueueBackend::External;

        let memory = Arc::new(MemoryTransport::new(
            config.transport.queue_capacity,
            response_ttl,
        ));
        let relational = if needs_relational {
            Some(Arc::new(
                RelationalTransport::connect(
                    &config.transport.database_url,
                    Duration::from_millis(config.transport.poll_interval_ms),
                    response_ttl,
                )
                .await?,
            ))
        } else {
            None
        };

        let take_relational = || {
            relational
                .clone()
                .ok_or_else(|| Error::Config("relational backend not initialized".into()))
        };

        let queue: Arc<dyn RequestQueue> = match config.transport.queue_backend {
            QueueBackend::Memory => memory.clone(),
            QueueBackend::External => take_relational()?,
        };
        let (responses, progress, threads, history): (
            Arc<dyn ResponseStore>,
            Arc<dyn ProgressLog>,
            Arc<dyn ThreadStore>,
            Arc<dyn HistoryStore>,
        ) = match config.transport.store_backend {
            StoreBackend::Memory => (
                memory.clone(),
                memory.clone(),
                memory.clone(),
                memory.clone(),
            ),
            StoreBackend::Relational => {
                let r = take_relational()?;
                (r.clone(), r.clone(), r.clone(), r)
            }
        };

        let turn_timeout = Duration::from_secs(config.pipeline.turn_timeout_secs);
        Ok(Self {
            config,
            queue,
            responses,
            progress,
            threads,
            history,
            llm,
            retriever,
            gate: Arc::new(ThreadGate::new(turn_timeout)),
        })
    }
}
