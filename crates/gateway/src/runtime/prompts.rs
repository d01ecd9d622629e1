//! Prompt templates for the pipeline's LLM calls.
//!
//! Kept together so wording changes stay reviewable in one place. The
//! decomposition prompt embeds the agent capability registry so the
//! planner only routes to paths that exist.

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan stage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn decomposition_system(registry_block: &str) -> String {
    format!(
        "You are the planning stage of a healthcare operations assistant. \
         Decompose the user's question into independently answerable subquestions \
         and route each to one of the available agent paths.\n\n\
         Available paths:\n{registry_block}\n\
         If the question cannot be answered without a missing piece of information \
         (for example the payer, plan, or state), name that slot in \
         required_clarifications instead of guessing.\n\n\
         Respond with JSON only:\n\
         {{\"subquestions\": [{{\"id\": \"sq1\", \"text\": \"…\", \"path\": \"rag\"}}], \
         \"required_clarifications\": []}}"
    )
}

pub fn decomposition_user(question: &str) -> String {
    format!("Question: {question}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolve stage (rag path)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const ANSWERING_SYSTEM: &str =
    "You answer operational healthcare-policy questions strictly from the provided \
     evidence passages. Cite passages by their [n] index. When the evidence does not \
     cover the question, say so plainly instead of speculating.";

pub fn answering_user(subquestion: &str, evidence_block: &str) -> String {
    format!("Evidence:\n{evidence_block}\n\nSubquestion: {subquestion}")
}

/// Evidence placeholder when retrieval produced nothing.
pub const NO_EVIDENCE_BLOCK: &str = "(no passages retrieved)";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Integrate stage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const INTEGRATOR_SYSTEM: &str =
    "You assemble the final answer card for a healthcare operations assistant. \
     Using the original question and the per-subquestion findings, produce JSON only, \
     with this shape:\n\
     {\"mode\": \"FACTUAL\"|\"CANONICAL\"|\"BLENDED\", \"direct_answer\": \"…\", \
     \"sections\": [{\"intent\": \"process\"|\"requirements\"|\"definitions\"|\"exceptions\"|\"references\", \
     \"label\": \"…\", \"bullets\": [\"…\"]}], \
     \"required_variables\": [], \"confidence_note\": \"…\", \"citations\": [], \"followups\": []}\n\
     Be direct, keep bullets short, and reflect low-confidence findings in confidence_note.";

pub fn integrator_user(question: &str, findings_block: &str) -> String {
    format!("Original question: {question}\n\nFindings:\n{findings_block}")
}

pub const REPAIR_SYSTEM: &str =
    "The previous output was supposed to be a single valid JSON answer card but did \
     not parse. Re-emit the same content as valid JSON matching the answer-card shape. \
     Output JSON only, no commentary.";

pub fn repair_user(raw_output: &str) -> String {
    format!("Previous output:\n{raw_output}")
}
