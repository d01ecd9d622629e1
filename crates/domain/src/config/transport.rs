use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport & store backends
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Memory,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Relational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub queue_backend: QueueBackend,
    #[serde(default)]
    pub store_backend: StoreBackend,
    /// SQLite URL for the relational backend / external queue
    /// (e.g. `sqlite://careflow.db`).
    #[serde(default = "d_database_url")]
    pub database_url: String,
    /// How long responses and progress events stay readable after the
    /// terminal event.
    #[serde(default = "d_response_ttl")]
    pub response_ttl_secs: u64,
    /// Bound of the in-memory request queue.
    #[serde(default = "d_queue_capacity")]
    pub queue_capacity: usize,
    /// Poll interval for relational live reads and queue pops.
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_backend: QueueBackend::default(),
            store_backend: StoreBackend::default(),
            database_url: d_database_url(),
            response_ttl_secs: d_response_ttl(),
            queue_capacity: d_queue_capacity(),
            poll_interval_ms: d_poll_interval_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_database_url() -> String {
    "sqlite://careflow.db".into()
}
fn d_response_ttl() -> u64 {
    900
}
fn d_queue_capacity() -> usize {
    256
}
fn d_poll_interval_ms() -> u64 {
    100
}
