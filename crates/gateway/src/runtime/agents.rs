//! Agent routing — the capability registry and per-path resolution.
//!
//! The registry is declared to the planner so decomposition only
//! produces routable subquestions; unknown paths are remapped to `rag`
//! upstream, at blueprint parse time.

use cf_domain::blueprint::{AgentPath, SubQuestion};
use cf_domain::message::{ChatMessage, SourceRef};
use cf_retrieval::SearchRequest;
use cf_providers::CompletionRequest;

use crate::runtime::emitter::ProgressEmitter;
use crate::runtime::prompts;
use crate::runtime::retry::with_retries;
use crate::state::AppState;

/// Degraded contribution when answer generation for one subquestion
/// exhausts its retries.
const COULD_NOT_RETRIEVE: &str =
    "I could not retrieve an answer for this part of the question.";

/// Most sources carried forward per subquestion.
const MAX_SOURCES: usize = 5;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Capability {
    pub path: AgentPath,
    pub competency: &'static str,
}

/// Declared competencies, rendered into the decomposition prompt.
pub const CAPABILITIES: &[Capability] = &[
    Capability {
        path: AgentPath::Rag,
        competency: "Policy and process lookup from the document corpus; falls back \
                     to web search when corpus confidence is low.",
    },
    Capability {
        path: AgentPath::Patient,
        competency: "Patient-specific records.",
    },
    Capability {
        path: AgentPath::Clinical,
        competency: "Clinical reasoning.",
    },
    Capability {
        path: AgentPath::Tool,
        competency: "Explicit tool invocations (lookups, scrapes).",
    },
];

pub fn registry_block() -> String {
    CAPABILITIES
        .iter()
        .map(|c| format!("- {}: {}", c.path.as_str(), c.competency))
        .collect::<Vec<_>>()
        .join("\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One resolved subquestion contribution.
#[derive(Debug, Clone)]
pub struct SubAnswer {
    pub subquestion_id: String,
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub low_confidence: bool,
}

/// Route one subquestion to its agent and collect the contribution.
///
/// Never fails the turn: rag degrades through empty evidence and the
/// could-not-retrieve sentence; the remaining paths return fixed
/// refusals.
pub async fn resolve_subquestion(
    state: &AppState,
    sq: &SubQuestion,
    jurisdiction: Option<&str>,
    emitter: &ProgressEmitter,
) -> SubAnswer {
    match sq.path {
        AgentPath::Rag => resolve_rag(state, sq, jurisdiction, emitter).await,
        AgentPath::Patient => refusal(sq, "I cannot access patient records."),
        AgentPath::Clinical => refusal(
            sq,
            "I cannot provide clinical reasoning; please consult clinical staff.",
        ),
        AgentPath::Tool => refusal(sq, "I cannot run external tools for this request."),
    }
}

fn refusal(sq: &SubQuestion, text: &str) -> SubAnswer {
    SubAnswer {
        subquestion_id: sq.id.clone(),
        text: text.to_string(),
        sources: Vec::new(),
        low_confidence: false,
    }
}

async fn resolve_rag(
    state: &AppState,
    sq: &SubQuestion,
    jurisdiction: Option<&str>,
    emitter: &ProgressEmitter,
) -> SubAnswer {
    emitter.thinking(&format!("Looking up: {}", sq.text)).await;

    // Evidence. Retrieval failure degrades to empty evidence.
    let passages = match state
        .retriever
        .search(SearchRequest {
            query: sq.text.clone(),
            top_k: state.config.retrieval.top_k,
            jurisdiction: jurisdiction.map(String::from),
        })
        .await
    {
        Ok(passages) => passages,
        Err(e) => {
            tracing::warn!(subquestion = %sq.id, error = %e, "retriever failed");
            emitter
                .thinking("Evidence lookup failed; continuing without sources")
                .await;
            Vec::new()
        }
    };

    let low_confidence = passages
        .first()
        .map(|p| p.score < state.config.retrieval.low_confidence_threshold)
        .unwrap_or(true);
    if passages.is_empty() {
        emitter
            .thinking("Proceeding with empty evidence for this subquestion")
            .await;
    } else if low_confidence {
        emitter
            .thinking("Corpus confidence is low for this subquestion")
            .await;
    }

    let evidence_block = if passages.is_empty() {
        prompts::NO_EVIDENCE_BLOCK.to_string()
    } else {
        passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[{}] {} — {}", i + 1, p.title, p.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let req = CompletionRequest {
        messages: vec![
            ChatMessage::system(prompts::ANSWERING_SYSTEM),
            ChatMessage::user(prompts::answering_user(&sq.text, &evidence_block)),
        ],
        temperature: Some(0.1),
        ..Default::default()
    };

    let attempts = state.config.pipeline.max_llm_attempts;
    let answer = with_retries("subquestion answer", attempts, || {
        let req = req.clone();
        async move { state.llm.complete(req).await }
    })
    .await;

    match answer {
        Ok(resp) => SubAnswer {
            subquestion_id: sq.id.clone(),
            text: resp.content,
            sources: sources_from_passages(&passages),
            low_confidence,
        },
        Err(e) => {
            tracing::warn!(subquestion = %sq.id, error = %e, "answer generation exhausted");
            emitter
                .thinking("Could not generate an answer for one subquestion")
                .await;
            SubAnswer {
                subquestion_id: sq.id.clone(),
                text: COULD_NOT_RETRIEVE.to_string(),
                sources: Vec::new(),
                low_confidence: true,
            }
        }
    }
}

/// Deduplicate passages into cited sources, best score per document.
fn sources_from_passages(passages: &[cf_retrieval::Passage]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for p in passages {
        if let Some(existing) = sources.iter_mut().find(|s| s.document_id == p.document_id) {
            if p.score > existing.score {
                existing.score = p.score;
            }
            continue;
        }
        sources.push(SourceRef {
            document_id: p.document_id.clone(),
            title: p.title.clone(),
            url: p.url.clone(),
            score: p.score,
        });
    }
    sources.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    sources.truncate(MAX_SOURCES);
    sources
}
