//! Turn execution — the seven-stage pipeline for one consumed request.
//!
//! Stages run sequentially on one task: load → classify → plan →
//! clarify-or-refine → resolve → integrate → publish. Concurrency
//! exists only across turns (one task per correlation id). The hard
//! turn timeout, terminal-event discipline, and thread-state
//! concurrency checks all live here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::Instrument;

use cf_domain::blueprint::{Blueprint, Clarification};
use cf_domain::message::{ResponseStatus, Role, SourceRef, TurnRequest, TurnResponse};
use cf_domain::thread::{StateDelta, ThreadState, TranscriptEntry};
use cf_domain::{Error, Result};
use cf_transport::{ThreadStore, TurnSummary};

use crate::api::poll::response_body;
use crate::runtime::agents::{resolve_subquestion, SubAnswer};
use crate::runtime::classify::{classify, Classification};
use crate::runtime::emitter::{ProgressEmitter, Stage};
use crate::runtime::integrate::{integrate, IntegrateOutcome};
use crate::runtime::plan::{build_blueprint, refine_blueprint, PlanOutcome};
use crate::runtime::truncate_str;
use crate::state::AppState;

/// Attempts for the optimistic thread-state write before the turn fails
/// with a state conflict.
const SAVE_ATTEMPTS: u32 = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn to its terminal state.
///
/// Never returns an error: every failure path publishes a `failed`
/// response and a terminal event (or logs the inconsistency when even
/// that is impossible), then releases the thread gate.
pub async fn run_turn(state: AppState, request: TurnRequest) {
    let span = tracing::info_span!(
        "turn",
        correlation_id = %request.correlation_id,
        thread_id = %request.thread_id,
    );

    async {
        tracing::debug!(message_len = request.message.len(), "turn started");
        let emitter = Arc::new(ProgressEmitter::new(
            state.progress.clone(),
            request.correlation_id,
        ));

        let turn_timeout = Duration::from_secs(state.config.pipeline.turn_timeout_secs);
        let outcome = tokio::time::timeout(
            turn_timeout,
            run_turn_inner(&state, &request, &emitter),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "turn failed");
                publish_failure(&state, &request, &emitter, &e.to_string()).await;
            }
            Err(_elapsed) => {
                tracing::warn!(timeout_secs = turn_timeout.as_secs(), "turn timed out");
                let diagnostic = format!(
                    "turn exceeded the {}s processing limit; please retry",
                    turn_timeout.as_secs()
                );
                publish_failure(&state, &request, &emitter, &diagnostic).await;
            }
        }

        state.gate.finish(request.thread_id);
    }
    .instrument(span)
    .await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The staged pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &AppState,
    request: &TurnRequest,
    emitter: &ProgressEmitter,
) -> Result<()> {
    // ── 1. Load ───────────────────────────────────────────────────
    emitter.stage(Stage::Load).await;
    let thread_state = state
        .threads
        .load(request.thread_id)
        .await?
        .unwrap_or_else(|| ThreadState::new(request.thread_id));

    // ── 2. Classify ───────────────────────────────────────────────
    let classification = classify(&thread_state, &request.message);
    match &classification {
        Classification::NewQuestion { .. } => emitter.stage(Stage::Classify).await,
        Classification::SlotFill { slot, value, .. } => {
            emitter
                .thinking(&format!("Resuming with {slot} = {value}"))
                .await;
        }
    }
    let effective_message = classification.effective_message().to_string();
    let fill = match &classification {
        Classification::SlotFill { slot, value, .. } => {
            Some((slot.clone(), value.clone()))
        }
        Classification::NewQuestion { .. } => None,
    };

    // ── 3. Plan ───────────────────────────────────────────────────
    let PlanOutcome { blueprint, notes } = match &classification {
        Classification::NewQuestion { .. } => {
            build_blueprint(state, &effective_message).await?
        }
        Classification::SlotFill { slot, value, .. } => {
            // The blueprint persisted by the clarification turn; its
            // presence is what made this a slot fill.
            let pending = thread_state.last_blueprint.clone().ok_or_else(|| {
                Error::Other("slot fill without a persisted blueprint".into())
            })?;
            refine_blueprint(pending, slot, value)
        }
    };
    for note in &notes {
        emitter.thinking(note).await;
    }
    emitter.stage(Stage::Plan).await;

    // ── 4. Clarify or refine ──────────────────────────────────────
    if !blueprint.required_clarifications.is_empty() {
        emitter.stage(Stage::Clarify).await;
        // A repeat ask (a fill that still left slots open) is reported
        // as refinement_ask rather than a first clarification.
        return publish_clarification(
            state,
            request,
            blueprint,
            &effective_message,
            fill.is_some(),
            emitter,
        )
        .await;
    }

    // ── 5. Resolve (sequential by contract) ───────────────────────
    emitter.stage(Stage::Resolve).await;
    let jurisdiction = thread_state.active_jurisdiction.clone();
    let mut subanswers: Vec<SubAnswer> = Vec::with_capacity(blueprint.subquestions.len());
    for sq in &blueprint.subquestions {
        subanswers.push(resolve_subquestion(state, sq, jurisdiction.as_deref(), emitter).await);
    }

    // ── 6. Integrate ──────────────────────────────────────────────
    emitter.stage(Stage::Integrate).await;
    let outcome = integrate(state, emitter, &effective_message, &subanswers).await?;

    // ── 7. Publish ────────────────────────────────────────────────
    emitter.stage(Stage::Publish).await;
    publish_completed(state, request, outcome, &subanswers, fill.as_ref(), emitter).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Publish paths
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Halt the pipeline with a structured ask. The blueprint and open
/// slots are persisted so the next message on this thread resumes the
/// plan instead of rebuilding it.
async fn publish_clarification(
    state: &AppState,
    request: &TurnRequest,
    blueprint: Blueprint,
    effective_message: &str,
    repeat_ask: bool,
    emitter: &ProgressEmitter,
) -> Result<()> {
    let ask = Clarification::for_blueprint(&blueprint);
    let prompt_text = clarification_text(&ask);
    let status = if repeat_ask {
        ResponseStatus::RefinementAsk
    } else {
        ResponseStatus::Clarification
    };

    save_with_retry(&state.threads, request.thread_id, |s| {
        s.apply(StateDelta::SetOpenSlots(ask.open_slots.clone()))
            .apply(StateDelta::SetBlueprint(Some(blueprint.clone())))
            .apply(StateDelta::SetRefinedQuery(Some(
                effective_message.to_string(),
            )))
    })
    .await?;

    state
        .threads
        .append_transcript(
            request.thread_id,
            &[
                TranscriptEntry::now(Role::User, request.message.clone()),
                TranscriptEntry::now(Role::Assistant, prompt_text.clone()),
            ],
        )
        .await?;

    let response = TurnResponse {
        correlation_id: request.correlation_id,
        thread_id: request.thread_id,
        status,
        message: prompt_text,
        sources: Vec::new(),
        source_confidence_strip: Vec::new(),
        thinking_log: emitter.log_lines(),
        model_used: None,
        error: None,
        clarification: Some(ask),
    };

    state.responses.put(response.clone()).await?;
    emitter.completed(response_body(&response)).await?;
    Ok(())
}

async fn publish_completed(
    state: &AppState,
    request: &TurnRequest,
    outcome: IntegrateOutcome,
    subanswers: &[SubAnswer],
    fill: Option<&(String, String)>,
    emitter: &ProgressEmitter,
) -> Result<()> {
    let sources = merge_sources(subanswers);
    let source_confidence_strip: Vec<f32> = sources.iter().map(|s| s.score).collect();

    // A filled jurisdiction-shaped slot scopes retrieval on later
    // turns of this thread.
    let jurisdiction_fill = fill
        .filter(|(slot, _)| slot == "jurisdiction" || slot == "state")
        .map(|(_, value)| value.clone());
    save_with_retry(&state.threads, request.thread_id, |s| {
        let next = s.apply(StateDelta::ClearPending);
        match &jurisdiction_fill {
            Some(value) => next.apply(StateDelta::SetJurisdiction(Some(value.clone()))),
            None => next,
        }
    })
    .await?;

    let assistant_text = outcome
        .card
        .as_ref()
        .map(|c| c.direct_answer.clone())
        .unwrap_or_else(|| outcome.message.clone());
    state
        .threads
        .append_transcript(
            request.thread_id,
            &[
                TranscriptEntry::now(Role::User, request.message.clone()),
                TranscriptEntry::now(Role::Assistant, assistant_text.clone()),
            ],
        )
        .await?;

    let response = TurnResponse {
        correlation_id: request.correlation_id,
        thread_id: request.thread_id,
        status: ResponseStatus::Completed,
        message: outcome.message,
        sources: sources.clone(),
        source_confidence_strip,
        thinking_log: emitter.log_lines(),
        model_used: outcome.model_used,
        error: None,
        clarification: None,
    };

    if let Err(e) = state
        .history
        .record_turn(&TurnSummary {
            correlation_id: request.correlation_id,
            thread_id: request.thread_id,
            question: request.message.trim().to_string(),
            answer_preview: truncate_str(&assistant_text, 200),
            status: ResponseStatus::Completed,
            sources,
            model_used: response.model_used.clone(),
            completed_at: Utc::now(),
        })
        .await
    {
        // History is a projection, not part of the response contract.
        tracing::warn!(error = %e, "failed to record turn history");
    }

    state.responses.put(response.clone()).await?;
    emitter.completed(response_body(&response)).await?;
    Ok(())
}

/// Terminal handling for every failure path: durable `failed` response
/// first, then the terminal `error` event. When even those writes fail
/// the inconsistency is logged — it cannot be propagated anywhere else.
async fn publish_failure(
    state: &AppState,
    request: &TurnRequest,
    emitter: &ProgressEmitter,
    diagnostic: &str,
) {
    let mut response =
        TurnResponse::failed(request.correlation_id, request.thread_id, diagnostic);
    response.thinking_log = emitter.log_lines();

    if let Err(e) = state
        .threads
        .append_transcript(
            request.thread_id,
            &[TranscriptEntry::now(Role::User, request.message.clone())],
        )
        .await
    {
        tracing::warn!(error = %e, "failed to record user message for failed turn");
    }

    if let Err(e) = state.responses.put(response.clone()).await {
        tracing::error!(
            correlation_id = %request.correlation_id,
            error = %e,
            "could not persist failed response; clients will poll into the void"
        );
    }

    if let Err(e) = emitter.error(response_body(&response)).await {
        tracing::error!(
            correlation_id = %request.correlation_id,
            error = %e,
            "could not emit terminal error event"
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Optimistic thread-state write: read the stored version, apply the
/// turn's deltas on top, and retry on conflict. A persistent conflict
/// means the per-thread serialization promise is broken somewhere and
/// the turn must fail.
async fn save_with_retry(
    threads: &Arc<dyn ThreadStore>,
    thread_id: cf_domain::ids::ThreadId,
    apply: impl Fn(ThreadState) -> ThreadState,
) -> Result<ThreadState> {
    let mut last_conflict = None;
    for _ in 0..SAVE_ATTEMPTS {
        let current = threads
            .load(thread_id)
            .await?
            .unwrap_or_else(|| ThreadState::new(thread_id));
        let expected = current.version;
        match threads.save(apply(current), expected).await {
            Ok(saved) => return Ok(saved),
            Err(Error::StateConflict(msg)) => {
                tracing::warn!(thread_id = %thread_id, "thread state conflict; re-reading");
                last_conflict = Some(msg);
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::StateConflict(
        last_conflict.unwrap_or_else(|| "please retry this message".into()),
    ))
}

fn clarification_text(ask: &Clarification) -> String {
    let asks: Vec<&str> = ask.options.iter().map(|o| o.label.as_str()).collect();
    if asks.is_empty() {
        "I need one more detail before I can answer.".to_string()
    } else {
        format!("Before I can answer: {}", asks.join(" "))
    }
}

/// Merge per-subquestion sources, best score per document, descending.
fn merge_sources(subanswers: &[SubAnswer]) -> Vec<SourceRef> {
    let mut merged: Vec<SourceRef> = Vec::new();
    for sa in subanswers {
        for src in &sa.sources {
            if let Some(existing) = merged.iter_mut().find(|s| s.document_id == src.document_id)
            {
                if src.score > existing.score {
                    existing.score = src.score;
                }
                continue;
            }
            merged.push(src.clone());
        }
    }
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}
