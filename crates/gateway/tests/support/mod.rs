//! Shared test doubles: a scripted LLM, a scripted retriever, and the
//! in-memory app-state harness.
#![allow(dead_code)] // each test binary uses a different subset

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cf_domain::config::Config;
use cf_domain::ids::ThreadId;
use cf_domain::message::{Role, TurnRequest};
use cf_domain::stream::{BoxStream, CompletionEvent};
use cf_domain::{Error, Result};
use cf_gateway::state::AppState;
use cf_providers::{CompletionRequest, CompletionResponse, LlmProvider};
use cf_retrieval::{Passage, Retriever, SearchRequest};

pub const PLAN_SINGLE_RAG: &str = r#"{
    "subquestions": [{"id": "sq1", "text": "what is prior authorization", "path": "rag"}],
    "required_clarifications": []
}"#;

pub const PLAN_NEEDS_PAYER: &str = r#"{
    "subquestions": [{"id": "sq1", "text": "what is the appeals process", "path": "rag"}],
    "required_clarifications": ["payer"]
}"#;

pub const ANSWER_TEXT: &str =
    "Prior authorization is approval obtained from the payer before a service is delivered [1].";

pub const CARD_JSON: &str = r#"{
    "mode": "FACTUAL",
    "direct_answer": "Prior authorization is approval obtained before a service is delivered.",
    "sections": [{"intent": "process", "label": "How it works", "bullets": ["Submit the request", "Await determination"]}],
    "confidence_note": "High confidence"
}"#;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed outputs per pipeline role, selected by the system prompt of
/// each call.
pub struct StubLlm {
    pub plan_json: String,
    pub answer_text: String,
    /// Streamed integrator output (the raw card text).
    pub card_json: String,
    /// Repair-call output; defaults to `card_json`.
    pub repair_json: Option<String>,
    /// When set, every streaming call fails (transient).
    pub fail_stream: bool,
    /// When set, every streaming call hangs far past any turn timeout.
    pub stall_stream: bool,
    pub complete_calls: AtomicU32,
    pub stream_calls: AtomicU32,
}

impl StubLlm {
    pub fn new(plan: &str, answer: &str, card: &str) -> Arc<Self> {
        Arc::new(Self {
            plan_json: plan.into(),
            answer_text: answer.into(),
            card_json: card.into(),
            repair_json: None,
            fail_stream: false,
            stall_stream: false,
            complete_calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
        })
    }

    pub fn happy() -> Arc<Self> {
        Self::new(PLAN_SINGLE_RAG, ANSWER_TEXT, CARD_JSON)
    }

    fn system_prompt(req: &CompletionRequest) -> String {
        req.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmProvider for StubLlm {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let system = Self::system_prompt(&req);
        let content = if system.contains("planning stage") {
            self.plan_json.clone()
        } else if system.contains("did not parse") {
            self.repair_json
                .clone()
                .unwrap_or_else(|| self.card_json.clone())
        } else {
            self.answer_text.clone()
        };
        Ok(CompletionResponse {
            content,
            usage: None,
            model: "stub-model".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn complete_stream(
        &self,
        _req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionEvent>>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stream {
            return Err(Error::Http("503 stream unavailable".into()));
        }
        if self.stall_stream {
            let stream = async_stream::stream! {
                tokio::time::sleep(std::time::Duration::from_secs(86_400)).await;
                yield Ok(CompletionEvent::Done { usage: None, finish_reason: None });
            };
            return Ok(Box::pin(stream));
        }

        let text = self.card_json.clone();
        // Split near the middle, on a char boundary, to exercise
        // multi-chunk relaying.
        let mut split = text.len() / 2;
        while !text.is_char_boundary(split) {
            split += 1;
        }
        let (a, b) = (text[..split].to_string(), text[split..].to_string());
        let stream = async_stream::stream! {
            yield Ok(CompletionEvent::Token { text: a });
            yield Ok(CompletionEvent::Token { text: b });
            yield Ok(CompletionEvent::Done { usage: None, finish_reason: Some("stop".into()) });
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        "stub"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted retriever
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StubRetriever {
    pub passages: Vec<Passage>,
    pub fail: AtomicBool,
}

impl StubRetriever {
    pub fn with_passages() -> Arc<Self> {
        Arc::new(Self {
            passages: vec![
                Passage {
                    document_id: "pol-7".into(),
                    title: "Prior Authorization SOP".into(),
                    snippet: "Approval must be obtained before the service date.".into(),
                    score: 0.92,
                    url: Some("https://kb.example.org/pol-7".into()),
                    jurisdiction: None,
                },
                Passage {
                    document_id: "pol-9".into(),
                    title: "Utilization Review Guide".into(),
                    snippet: "Determinations are issued within 14 days.".into(),
                    score: 0.71,
                    url: None,
                    jurisdiction: None,
                },
            ],
            fail: AtomicBool::new(false),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            passages: Vec::new(),
            fail: AtomicBool::new(false),
        })
    }
}

#[async_trait::async_trait]
impl Retriever for StubRetriever {
    async fn search(&self, _req: SearchRequest) -> Result<Vec<Passage>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Retrieval("vector store unavailable".into()));
        }
        Ok(self.passages.clone())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn state_with(llm: Arc<StubLlm>, retriever: Arc<StubRetriever>) -> AppState {
    AppState::build(Arc::new(Config::default()), llm, retriever)
        .await
        .expect("memory substrate never fails to build")
}

pub fn request(message: &str, thread_id: ThreadId) -> TurnRequest {
    TurnRequest::new(message, thread_id)
}
