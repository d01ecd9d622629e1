use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Hard cap for one turn. On expiry the turn fails with a terminal
    /// event.
    #[serde(default = "d_turn_timeout")]
    pub turn_timeout_secs: u64,
    /// Bounded retry budget per LLM call.
    #[serde(default = "d_max_llm_attempts")]
    pub max_llm_attempts: u32,
    /// Idle cap for one streaming connection; clients reconnect and
    /// resume from the last observed seq.
    #[serde(default = "d_stream_idle_timeout")]
    pub stream_idle_timeout_secs: u64,
    /// Number of concurrent queue consumers.
    #[serde(default = "d_workers")]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: d_turn_timeout(),
            max_llm_attempts: d_max_llm_attempts(),
            stream_idle_timeout_secs: d_stream_idle_timeout(),
            workers: d_workers(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_turn_timeout() -> u64 {
    120
}
fn d_max_llm_attempts() -> u32 {
    3
}
fn d_stream_idle_timeout() -> u64 {
    60
}
fn d_workers() -> usize {
    4
}
