//! Append-only status history for actions.
//!
//! Every accepted transition writes exactly one row; rows are immutable
//! once written and survive the action reaching a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::ActionState;

/// One entry in an action's transition log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStatus {
    pub id: i64,
    pub action_id: i64,
    pub status: ActionState,
    pub occurred_at: DateTime<Utc>,
    /// Free-text messages reported by the device or the engine
    pub messages: Vec<String>,
    /// Principal or subsystem that caused the transition
    pub reported_by: String,
}

/// New status entry for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActionStatus {
    pub action_id: i64,
    pub status: ActionState,
    pub messages: Vec<String>,
    pub reported_by: String,
}

impl NewActionStatus {
    pub fn new(action_id: i64, status: ActionState, reported_by: impl Into<String>) -> Self {
        Self {
            action_id,
            status,
            messages: Vec::new(),
            reported_by: reported_by.into(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<String>) -> Self {
        self.messages = messages;
        self
    }
}
