use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One OpenAI-compatible completion backend. The key is read from the
/// environment variable named by `api_key_env`, never from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider id used in logs and `model_used` attribution.
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            request_timeout_secs: d_request_timeout(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_provider() -> String {
    "openai".into()
}
fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-4o".into()
}
fn d_api_key_env() -> String {
    "CAREFLOW_LLM_API_KEY".into()
}
fn d_request_timeout() -> u64 {
    90
}
