//! # Rollout Model
//!
//! A bulk deployment campaign: a target filter selecting the fleet slice,
//! the distribution set to install, an action template (type, forced
//! time, weight, maintenance window) applied to every created action, and
//! an ordered list of groups with progression thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::maintenance::MaintenanceWindow;
use crate::models::action::ActionType;
use crate::models::rollout_group::GroupSpec;
use crate::state_machine::RolloutState;

/// A staged deployment campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollout {
    pub id: i64,
    pub tenant: String,
    pub name: String,
    /// Filter query selecting the eligible targets, validated at creation
    pub target_filter: String,
    pub distribution_set_id: i64,
    /// Template applied to every action this rollout creates
    pub action_type: ActionType,
    pub forced_time: Option<DateTime<Utc>>,
    pub maintenance_window: Option<MaintenanceWindow>,
    pub weight: i32,
    pub status: RolloutState,
    /// Whether an operator must approve before the rollout can start
    pub approval_required: bool,
    pub approval_decided_by: Option<String>,
    pub approval_remark: Option<String>,
    /// Matched target count, set while the rollout is CREATING
    pub total_targets: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New rollout for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRollout {
    pub name: String,
    pub target_filter: String,
    pub distribution_set_id: i64,
    pub action_type: ActionType,
    pub forced_time: Option<DateTime<Utc>>,
    pub maintenance_window: Option<MaintenanceWindow>,
    /// Defaults to the tenant's configured default weight
    pub weight: Option<i32>,
    /// Force the approval workflow even if the tenant default is off
    pub approval_required: bool,
    pub groups: Vec<GroupSpec>,
}

impl NewRollout {
    pub fn new(
        name: impl Into<String>,
        target_filter: impl Into<String>,
        distribution_set_id: i64,
        groups: Vec<GroupSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            target_filter: target_filter.into(),
            distribution_set_id,
            action_type: ActionType::default(),
            forced_time: None,
            maintenance_window: None,
            weight: None,
            approval_required: false,
            groups,
        }
    }
}

impl Rollout {
    /// Whether the scheduler tick has work to do for this rollout.
    pub fn needs_handling(&self) -> bool {
        self.status.needs_handling()
    }
}
