//! # Rollout Group Model
//!
//! An ordered partition of a rollout's matched targets, carrying the
//! success/error conditions that gate progression to the next group.
//!
//! Threshold semantics are explicit and configurable: a condition compares
//! either a percentage of the group's total target count (integer math, no
//! floats) or an absolute count. The error condition additionally selects
//! the pause scope: pause the whole rollout (default) or record the group
//! as errored and continue with its successor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::RolloutGroupState;

/// How a threshold value is compared against group counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Value is a percentage of the group's total targets (0..=100)
    Percent,
    /// Value is an absolute number of actions
    Absolute,
}

/// Condition that finishes a group and unblocks its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessCondition {
    pub mode: ThresholdMode,
    pub value: u32,
}

impl SuccessCondition {
    /// Met when enough actions finished: `finished >= threshold`.
    pub fn is_met(&self, finished: u64, total: u64) -> bool {
        match self.mode {
            ThresholdMode::Percent => finished * 100 >= u64::from(self.value) * total,
            ThresholdMode::Absolute => finished >= u64::from(self.value),
        }
    }
}

impl Default for SuccessCondition {
    fn default() -> Self {
        Self {
            mode: ThresholdMode::Percent,
            value: 100,
        }
    }
}

/// What happens to the parent rollout when a group breaches its error
/// threshold. The group itself always transitions to ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Pause the rollout for operator intervention
    PauseRollout,
    /// Record the errored group and keep activating successors
    ContinueRollout,
}

impl Default for ErrorAction {
    fn default() -> Self {
        Self::PauseRollout
    }
}

/// Condition that marks a group as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCondition {
    pub mode: ThresholdMode,
    pub value: u32,
    #[serde(default)]
    pub action: ErrorAction,
}

impl ErrorCondition {
    /// Breached when errors exceed the tolerance: `errored > threshold`.
    pub fn is_breached(&self, errored: u64, total: u64) -> bool {
        match self.mode {
            ThresholdMode::Percent => errored * 100 > u64::from(self.value) * total,
            ThresholdMode::Absolute => errored > u64::from(self.value),
        }
    }
}

/// A partition of a rollout's targets with its own progression gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutGroup {
    pub id: i64,
    pub tenant: String,
    pub rollout_id: i64,
    pub name: String,
    /// Execution order, zero-based and contiguous within a rollout
    pub ordinal: i32,
    /// Optional sub-filter narrowing this group's candidate pool
    pub target_filter: Option<String>,
    /// Share of the still-unclaimed candidates this group takes (1..=100);
    /// the last group always sweeps every remaining target
    pub target_percentage: u8,
    pub success_condition: SuccessCondition,
    pub error_condition: Option<ErrorCondition>,
    pub status: RolloutGroupState,
    /// Materialized membership size, set while the rollout is CREATING
    pub total_targets: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Template for one group, supplied at rollout creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Defaults to "group-<ordinal+1>"
    pub name: Option<String>,
    pub target_filter: Option<String>,
    pub target_percentage: u8,
    pub success_condition: SuccessCondition,
    pub error_condition: Option<ErrorCondition>,
}

impl Default for GroupSpec {
    fn default() -> Self {
        Self {
            name: None,
            target_filter: None,
            target_percentage: 100,
            success_condition: SuccessCondition::default(),
            error_condition: None,
        }
    }
}

impl GroupSpec {
    /// Build `count` specs that split the matched targets into roughly
    /// equal parts, all using the given conditions.
    ///
    /// Percentages apply to the targets still unclaimed at each ordinal,
    /// so group `i` of `n` takes `100 / (n - i)` percent of what is left.
    pub fn equal_split(
        count: usize,
        success_condition: SuccessCondition,
        error_condition: Option<ErrorCondition>,
    ) -> Vec<GroupSpec> {
        (0..count)
            .map(|i| GroupSpec {
                name: None,
                target_filter: None,
                target_percentage: (100 / (count - i)).min(100) as u8,
                success_condition,
                error_condition,
            })
            .collect()
    }
}
