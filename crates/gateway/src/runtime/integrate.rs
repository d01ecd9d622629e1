//! Integrate — produce the final answer card.
//!
//! One streaming LLM call assembles the card from the per-subquestion
//! findings, relaying tokens as `message_chunk` events. Card parsing is
//! strict; a parse failure triggers one repair call, and a second
//! failure downgrades to the raw prose text. Only exhaustion of the
//! primary call fails the turn.

use futures_util::StreamExt;

use cf_domain::answer::AnswerCard;
use cf_domain::message::ChatMessage;
use cf_domain::stream::CompletionEvent;
use cf_domain::{Error, Result};
use cf_providers::CompletionRequest;

use crate::runtime::agents::SubAnswer;
use crate::runtime::emitter::ProgressEmitter;
use crate::runtime::prompts;
use crate::runtime::retry::with_retries;
use crate::state::AppState;

/// The integrator's output: the response body plus the parsed card when
/// formatting succeeded.
#[derive(Debug, Clone)]
pub struct IntegrateOutcome {
    /// Serialized answer card, or raw prose on repair failure.
    pub message: String,
    pub card: Option<AnswerCard>,
    pub model_used: Option<String>,
}

pub async fn integrate(
    state: &AppState,
    emitter: &ProgressEmitter,
    question: &str,
    subanswers: &[SubAnswer],
) -> Result<IntegrateOutcome> {
    let findings_block = findings_block(subanswers);
    let req = CompletionRequest {
        messages: vec![
            ChatMessage::system(prompts::INTEGRATOR_SYSTEM),
            ChatMessage::user(prompts::integrator_user(question, &findings_block)),
        ],
        temperature: Some(0.2),
        ..Default::default()
    };

    let attempts = state.config.pipeline.max_llm_attempts;
    let raw = with_retries("integrate", attempts, || {
        let req = req.clone();
        async move { stream_completion(state, emitter, req).await }
    })
    .await?;

    let model_used = Some(state.config.llm.model.clone());

    // Strict parse, then one repair pass, then prose fallback.
    if let Ok(card) = AnswerCard::parse(&raw) {
        return Ok(IntegrateOutcome {
            message: serde_json::to_string(&card)?,
            card: Some(card),
            model_used,
        });
    }

    emitter
        .thinking("Answer formatting needed a repair pass")
        .await;
    match repair(state, &raw).await {
        Ok(card) => Ok(IntegrateOutcome {
            message: serde_json::to_string(&card)?,
            card: Some(card),
            model_used,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "answer card repair failed; falling back to prose");
            emitter
                .thinking("Returning the answer as plain text")
                .await;
            Ok(IntegrateOutcome {
                message: raw,
                card: None,
                model_used,
            })
        }
    }
}

/// Run one streaming completion, relaying tokens as chunk events, and
/// return the accumulated text.
async fn stream_completion(
    state: &AppState,
    emitter: &ProgressEmitter,
    req: CompletionRequest,
) -> Result<String> {
    let mut stream = state.llm.complete_stream(req).await?;
    let mut buf = String::new();

    while let Some(event) = stream.next().await {
        match event? {
            CompletionEvent::Token { text } => {
                emitter.chunk(&text).await;
                buf.push_str(&text);
            }
            CompletionEvent::Done { .. } => break,
            CompletionEvent::Error { message } => {
                return Err(Error::Provider {
                    provider: state.llm.provider_id().to_string(),
                    message,
                });
            }
        }
    }

    Ok(buf)
}

async fn repair(state: &AppState, raw: &str) -> Result<AnswerCard> {
    let req = CompletionRequest {
        messages: vec![
            ChatMessage::system(prompts::REPAIR_SYSTEM),
            ChatMessage::user(prompts::repair_user(raw)),
        ],
        temperature: Some(0.0),
        json_mode: true,
        ..Default::default()
    };

    let attempts = state.config.pipeline.max_llm_attempts;
    let response = with_retries("card repair", attempts, || {
        let req = req.clone();
        async move { state.llm.complete(req).await }
    })
    .await?;

    AnswerCard::parse(&response.content).map_err(|e| Error::Provider {
        provider: state.llm.provider_id().to_string(),
        message: format!("repaired card still unparseable: {e}"),
    })
}

/// Render the findings for the integrator prompt.
fn findings_block(subanswers: &[SubAnswer]) -> String {
    subanswers
        .iter()
        .map(|sa| {
            let confidence = if sa.low_confidence {
                " [low confidence]"
            } else {
                ""
            };
            format!("({}){} {}", sa.subquestion_id, confidence, sa.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_block_marks_low_confidence() {
        let block = findings_block(&[
            SubAnswer {
                subquestion_id: "sq1".into(),
                text: "answer one".into(),
                sources: Vec::new(),
                low_confidence: false,
            },
            SubAnswer {
                subquestion_id: "sq2".into(),
                text: "answer two".into(),
                sources: Vec::new(),
                low_confidence: true,
            },
        ]);
        assert!(block.contains("(sq1) answer one"));
        assert!(block.contains("(sq2) [low confidence] answer two"));
    }
}
