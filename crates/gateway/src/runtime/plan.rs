//! Plan — build or refine the blueprint.
//!
//! New questions get a fresh blueprint from a decomposition LLM call
//! carrying the capability registry. Slot-fill turns refine the
//! persisted blueprint in place instead of rebuilding it.

use serde::Deserialize;

use cf_domain::blueprint::{AgentPath, Blueprint, SubQuestion};
use cf_domain::message::ChatMessage;
use cf_domain::Result;
use cf_providers::CompletionRequest;

use crate::runtime::agents::registry_block;
use crate::runtime::prompts;
use crate::runtime::retry::with_retries;
use crate::state::AppState;

/// A built blueprint plus thinking-log notes accumulated on the way
/// (unknown-path remaps, parse fallbacks).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub blueprint: Blueprint,
    pub notes: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner output parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct RawBlueprint {
    #[serde(default)]
    subquestions: Vec<RawSubQuestion>,
    #[serde(default)]
    required_clarifications: Vec<String>,
}

#[derive(Deserialize)]
struct RawSubQuestion {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    path: Option<String>,
}

/// Parse raw planner output. Unknown paths are remapped to `rag` with a
/// note; missing ids are assigned positionally.
pub fn parse_blueprint(raw: &str) -> std::result::Result<PlanOutcome, serde_json::Error> {
    let raw_bp: RawBlueprint = serde_json::from_str(strip_code_fence(raw))?;
    let mut notes = Vec::new();

    let subquestions = raw_bp
        .subquestions
        .into_iter()
        .enumerate()
        .map(|(i, sq)| {
            let id = sq.id.unwrap_or_else(|| format!("sq{}", i + 1));
            let path = match sq.path.as_deref() {
                Some(p) => AgentPath::parse(p).unwrap_or_else(|| {
                    notes.push(format!("Unknown path \"{p}\" for {id}; routing to rag"));
                    AgentPath::Rag
                }),
                None => AgentPath::Rag,
            };
            SubQuestion {
                id,
                text: sq.text,
                path,
            }
        })
        .collect();

    Ok(PlanOutcome {
        blueprint: Blueprint {
            subquestions,
            required_clarifications: raw_bp.required_clarifications,
        },
        notes,
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blueprint construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a fresh blueprint for a new question.
///
/// Transient LLM failures are retried; exhaustion fails the turn (the
/// plan stage has no degraded form). Unparseable planner output does
/// not fail the turn — the question is answered directly through a
/// single rag subquestion.
pub async fn build_blueprint(state: &AppState, effective_message: &str) -> Result<PlanOutcome> {
    let req = CompletionRequest {
        messages: vec![
            ChatMessage::system(prompts::decomposition_system(&registry_block())),
            ChatMessage::user(prompts::decomposition_user(effective_message)),
        ],
        temperature: Some(0.0),
        json_mode: true,
        ..Default::default()
    };

    let attempts = state.config.pipeline.max_llm_attempts;
    let response = with_retries("plan decomposition", attempts, || {
        let req = req.clone();
        async move { state.llm.complete(req).await }
    })
    .await?;

    match parse_blueprint(&response.content) {
        Ok(outcome) if !outcome.blueprint.subquestions.is_empty()
            || !outcome.blueprint.required_clarifications.is_empty() =>
        {
            Ok(outcome)
        }
        Ok(_) | Err(_) => Ok(fallback_plan(effective_message)),
    }
}

/// Refine the persisted blueprint with a slot fill and re-evaluate the
/// remaining clarifications.
pub fn refine_blueprint(mut blueprint: Blueprint, slot: &str, value: &str) -> PlanOutcome {
    blueprint.apply_fill(slot, value);
    PlanOutcome {
        blueprint,
        notes: vec![format!("Applied {slot} = {value} to the pending plan")],
    }
}

fn fallback_plan(effective_message: &str) -> PlanOutcome {
    PlanOutcome {
        blueprint: Blueprint {
            subquestions: vec![SubQuestion {
                id: "sq1".into(),
                text: effective_message.to_string(),
                path: AgentPath::Rag,
            }],
            required_clarifications: Vec::new(),
        },
        notes: vec!["Planner output was unusable; answering the question directly".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_well_formed_plan() {
        let raw = r#"{
            "subquestions": [
                {"id": "sq1", "text": "definition of prior auth", "path": "rag"},
                {"text": "patient's current auth status", "path": "patient"}
            ],
            "required_clarifications": []
        }"#;
        let outcome = parse_blueprint(raw).unwrap();
        assert_eq!(outcome.blueprint.subquestions.len(), 2);
        assert_eq!(outcome.blueprint.subquestions[1].id, "sq2");
        assert_eq!(outcome.blueprint.subquestions[1].path, AgentPath::Patient);
        assert!(outcome.notes.is_empty());
    }

    #[test]
    fn unknown_path_remaps_to_rag_with_note() {
        let raw = r#"{"subquestions": [{"id": "sq1", "text": "t", "path": "web_search"}]}"#;
        let outcome = parse_blueprint(raw).unwrap();
        assert_eq!(outcome.blueprint.subquestions[0].path, AgentPath::Rag);
        assert_eq!(outcome.notes.len(), 1);
        assert!(outcome.notes[0].contains("web_search"));
    }

    #[test]
    fn fenced_output_parses() {
        let raw = "```json\n{\"subquestions\": [{\"text\": \"t\"}]}\n```";
        let outcome = parse_blueprint(raw).unwrap();
        assert_eq!(outcome.blueprint.subquestions[0].path, AgentPath::Rag);
    }

    #[test]
    fn prose_is_a_parse_error() {
        assert!(parse_blueprint("I will split this into two parts.").is_err());
    }

    #[test]
    fn refine_consumes_the_slot() {
        let bp = Blueprint {
            subquestions: vec![SubQuestion {
                id: "sq1".into(),
                text: "appeals process".into(),
                path: AgentPath::Rag,
            }],
            required_clarifications: vec!["payer".into()],
        };
        let outcome = refine_blueprint(bp, "payer", "Sunshine Health");
        assert!(outcome.blueprint.required_clarifications.is_empty());
        assert!(outcome.blueprint.subquestions[0]
            .text
            .contains("payer: Sunshine Health"));
    }
}
