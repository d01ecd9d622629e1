use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the external retrieval service. Empty disables
    /// retrieval (answers degrade to no-evidence).
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "d_top_k")]
    pub top_k: usize,
    /// Below this top score the rag agent annotates the answer as
    /// low-confidence.
    #[serde(default = "d_low_confidence")]
    pub low_confidence_threshold: f32,
    #[serde(default = "d_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            top_k: d_top_k(),
            low_confidence_threshold: d_low_confidence(),
            request_timeout_secs: d_request_timeout(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_top_k() -> usize {
    8
}
fn d_low_confidence() -> f32 {
    0.35
}
fn d_request_timeout() -> u64 {
    20
}
