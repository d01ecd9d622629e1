//! OpenAI-compatible adapter.
//!
//! Works with OpenAI and any endpoint following the chat-completions
//! contract (Azure-compatible gateways, Ollama, vLLM, LM Studio,
//! Together, …). The API key is read from the environment variable
//! named in the config; an unset variable means unauthenticated access
//! (local inference servers).

use serde_json::Value;

use cf_domain::config::LlmConfig;
use cf_domain::message::{ChatMessage, Role};
use cf_domain::stream::{BoxStream, CompletionEvent, Usage};
use cf_domain::{Error, Result};

use crate::sse::sse_completion_stream;
use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %cfg.api_key_env,
                "LLM API key env var unset; sending unauthenticated requests"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            id: cfg.provider.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            client,
        })
    }

    // ── Internal: request plumbing ─────────────────────────────────

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    fn effective_model(&self, req: &CompletionRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_body(&self, req: &CompletionRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": stream,
        });
        if let Some(t) = req.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    fn provider_err(&self, message: impl Into<String>) -> Error {
        Error::Provider {
            provider: self.id.clone(),
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmProvider impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_body(&req, false);
        let response = self
            .authed_post(&self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(self.provider_err(format!("{status}: {text}")));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| self.provider_err(format!("malformed response body: {e}")))?;
        parse_completion(&parsed).map_err(|msg| self.provider_err(msg))
    }

    async fn complete_stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionEvent>>> {
        let body = self.build_body(&req, true);
        let response = self
            .authed_post(&self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.provider_err(format!("{status}: {text}")));
        }

        Ok(sse_completion_stream(response, parse_stream_payload))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire-format mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    serde_json::json!({ "role": role, "content": msg.content })
}

fn parse_completion(parsed: &Value) -> std::result::Result<CompletionResponse, String> {
    let choice = parsed["choices"]
        .get(0)
        .ok_or("response has no choices")?;
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    Ok(CompletionResponse {
        content,
        usage: parse_usage(&parsed["usage"]),
        model: parsed["model"].as_str().unwrap_or_default().to_string(),
        finish_reason: choice["finish_reason"].as_str().map(String::from),
    })
}

fn parse_usage(usage: &Value) -> Option<Usage> {
    usage.as_object().map(|u| Usage {
        prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
    })
}

/// Parse one streaming `data:` payload into completion events.
fn parse_stream_payload(payload: &str) -> Vec<Result<CompletionEvent>> {
    if payload == "[DONE]" {
        // The final usage chunk (when present) precedes the sentinel;
        // the stream wrapper emits a fallback Done otherwise.
        return Vec::new();
    }

    let parsed: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            return vec![Err(Error::Http(format!("malformed stream chunk: {e}")))];
        }
    };

    let mut events = Vec::new();

    if let Some(choice) = parsed["choices"].get(0) {
        if let Some(text) = choice["delta"]["content"].as_str() {
            if !text.is_empty() {
                events.push(Ok(CompletionEvent::Token { text: text.into() }));
            }
        }
        if let Some(reason) = choice["finish_reason"].as_str() {
            events.push(Ok(CompletionEvent::Done {
                usage: parse_usage(&parsed["usage"]),
                finish_reason: Some(reason.into()),
            }));
        }
    } else if parsed["usage"].is_object() {
        // Usage-only trailer chunk (stream_options.include_usage).
        events.push(Ok(CompletionEvent::Done {
            usage: parse_usage(&parsed["usage"]),
            finish_reason: None,
        }));
    }

    events
}
