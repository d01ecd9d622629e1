//! Classify — slot-fill reply or new question.
//!
//! A message on a thread whose previous turn ended in a clarification
//! ask (open slots + a persisted blueprint) is a slot-fill; anything
//! else starts a new question. The stage's output is the effective
//! message the rest of the pipeline works with.

use cf_domain::thread::ThreadState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    NewQuestion {
        effective_message: String,
    },
    SlotFill {
        slot: String,
        value: String,
        /// The original question augmented with the fill.
        effective_message: String,
    },
}

impl Classification {
    pub fn effective_message(&self) -> &str {
        match self {
            Self::NewQuestion { effective_message }
            | Self::SlotFill {
                effective_message, ..
            } => effective_message,
        }
    }
}

pub fn classify(state: &ThreadState, message: &str) -> Classification {
    let message = message.trim();

    if state.awaiting_clarification() {
        // One fill per turn: the first open slot is the one the ask
        // led with.
        let slot = state.open_slots[0].clone();
        let value = message.to_string();
        let original = state
            .refined_query
            .clone()
            .unwrap_or_else(|| message.to_string());
        let effective_message = format!("{original} ({slot}: {value})");
        return Classification::SlotFill {
            slot,
            value,
            effective_message,
        };
    }

    Classification::NewQuestion {
        effective_message: message.to_string(),
    }
}
