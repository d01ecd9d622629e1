//! Blueprints — the decomposition plan for resolving a user question.
//!
//! The planner breaks a question into routable subquestions and names the
//! slots it still needs filled. A blueprint built on the first turn of a
//! question is persisted in thread state across clarification turns and
//! refined in place, never rebuilt from scratch.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent paths
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The agent category a subquestion is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPath {
    /// Policy/process lookup from the document corpus.
    Rag,
    /// Patient-specific records (refused).
    Patient,
    /// Clinical reasoning (reserved).
    Clinical,
    /// Explicit tool invocations (reserved).
    Tool,
}

impl AgentPath {
    /// Parse a planner-supplied path string. Returns `None` for unknown
    /// paths; callers remap those to [`AgentPath::Rag`] and note it in
    /// the thinking log.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rag" => Some(Self::Rag),
            "patient" => Some(Self::Patient),
            "clinical" => Some(Self::Clinical),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Patient => "patient",
            Self::Clinical => "clinical",
            Self::Tool => "tool",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blueprint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One routable subquestion in a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub id: String,
    pub text: String,
    pub path: AgentPath,
}

/// The execution plan for resolving a user question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Blueprint {
    pub subquestions: Vec<SubQuestion>,
    /// Slot names the planner could not resolve from the question alone.
    #[serde(default)]
    pub required_clarifications: Vec<String>,
}

impl Blueprint {
    /// Whether the pipeline can proceed to resolution.
    pub fn is_resolvable(&self) -> bool {
        self.required_clarifications.is_empty() && !self.subquestions.is_empty()
    }

    /// Apply a slot fill: the named slot is no longer a pending
    /// clarification, and every subquestion text gains the fill as
    /// qualifying context.
    pub fn apply_fill(&mut self, slot: &str, value: &str) {
        self.required_clarifications.retain(|s| s != slot);
        for sq in &mut self.subquestions {
            sq.text = format!("{} ({slot}: {value})", sq.text);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Clarification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A labeled value a user can pick to fill a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChoice {
    pub value: String,
    pub label: String,
}

/// The per-slot choice set offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationOption {
    pub slot: String,
    pub label: String,
    #[serde(default)]
    pub choices: Vec<SlotChoice>,
}

/// The structured ask emitted when the pipeline cannot resolve.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Clarification {
    pub open_slots: Vec<String>,
    #[serde(default)]
    pub options: Vec<ClarificationOption>,
}

impl Clarification {
    /// Build the ask for a blueprint's pending slots, with a generic
    /// free-text option per slot.
    pub fn for_blueprint(bp: &Blueprint) -> Self {
        let options = bp
            .required_clarifications
            .iter()
            .map(|slot| ClarificationOption {
                slot: slot.clone(),
                label: format!("Which {slot} does this apply to?"),
                choices: Vec::new(),
            })
            .collect();
        Self {
            open_slots: bp.required_clarifications.clone(),
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Blueprint {
        Blueprint {
            subquestions: vec![SubQuestion {
                id: "sq1".into(),
                text: "what is the appeals process".into(),
                path: AgentPath::Rag,
            }],
            required_clarifications: vec!["payer".into()],
        }
    }

    #[test]
    fn path_parse_known_and_unknown() {
        assert_eq!(AgentPath::parse("rag"), Some(AgentPath::Rag));
        assert_eq!(AgentPath::parse("  Patient "), Some(AgentPath::Patient));
        assert_eq!(AgentPath::parse("web_search"), None);
        assert_eq!(AgentPath::parse(""), None);
    }

    #[test]
    fn fill_clears_slot_and_qualifies_text() {
        let mut bp = sample();
        assert!(!bp.is_resolvable());

        bp.apply_fill("payer", "Sunshine Health");
        assert!(bp.required_clarifications.is_empty());
        assert!(bp.is_resolvable());
        assert!(bp.subquestions[0].text.contains("payer: Sunshine Health"));
    }

    #[test]
    fn fill_unknown_slot_is_noop_on_clarifications() {
        let mut bp = sample();
        bp.apply_fill("state", "FL");
        assert_eq!(bp.required_clarifications, vec!["payer".to_string()]);
    }

    #[test]
    fn clarification_for_blueprint() {
        let bp = sample();
        let ask = Clarification::for_blueprint(&bp);
        assert_eq!(ask.open_slots, vec!["payer".to_string()]);
        assert_eq!(ask.options.len(), 1);
        assert_eq!(ask.options[0].slot, "payer");
    }

    #[test]
    fn blueprint_json_round_trip() {
        let bp = sample();
        let json = serde_json::to_string(&bp).unwrap();
        let back: Blueprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bp);
    }

    #[test]
    fn empty_blueprint_not_resolvable() {
        assert!(!Blueprint::default().is_resolvable());
    }
}
