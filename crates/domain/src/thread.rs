//! Per-thread conversational state.
//!
//! `ThreadState` is an immutable value: every mutation goes through
//! [`ThreadState::apply`], which consumes a whole-field [`StateDelta`] and
//! returns the next state. There are no shallow merges of partial
//! fragments. Persistence bumps `version` under an optimistic concurrency
//! check, so concurrent turns on the same thread cannot silently lose
//! updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;
use crate::ids::ThreadId;
use crate::message::Role;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ThreadState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub thread_id: ThreadId,
    /// Monotonically increasing; bumped by the store on each persisted
    /// write.
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_jurisdiction: Option<String>,
    /// Slot names awaiting a user fill. Non-empty means the previous turn
    /// ended in a clarification ask.
    #[serde(default)]
    pub open_slots: Vec<String>,
    /// The original question, preserved across clarification turns so a
    /// slot fill can be merged back into it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_query: Option<String>,
    /// The blueprint persisted across clarification turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_blueprint: Option<Blueprint>,
}

impl ThreadState {
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            version: 0,
            active_jurisdiction: None,
            open_slots: Vec::new(),
            refined_query: None,
            last_blueprint: None,
        }
    }

    /// Whether the thread is waiting on a clarification reply.
    pub fn awaiting_clarification(&self) -> bool {
        !self.open_slots.is_empty() && self.last_blueprint.is_some()
    }

    /// Apply one delta, producing the next state. Whole fields are
    /// replaced; nothing is merged.
    pub fn apply(mut self, delta: StateDelta) -> Self {
        match delta {
            StateDelta::SetJurisdiction(j) => self.active_jurisdiction = j,
            StateDelta::SetOpenSlots(slots) => self.open_slots = slots,
            StateDelta::SetRefinedQuery(q) => self.refined_query = q,
            StateDelta::SetBlueprint(bp) => self.last_blueprint = bp,
            StateDelta::ClearPending => {
                self.open_slots = Vec::new();
                self.refined_query = None;
                self.last_blueprint = None;
            }
        }
        self
    }
}

/// Whole-field replacement deltas for [`ThreadState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateDelta {
    SetJurisdiction(Option<String>),
    SetOpenSlots(Vec<String>),
    SetRefinedQuery(Option<String>),
    SetBlueprint(Option<Blueprint>),
    /// Clear slots, refined query, and blueprint after a completed turn.
    ClearPending,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry in a thread's conversation transcript, appended at turn
/// completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
