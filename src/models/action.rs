//! # Action Model
//!
//! One in-progress or completed assignment of a distribution set to a
//! target. Actions are created by the deployment manager (manual
//! assignment or rollout group activation) and only ever closed by state
//! transitions; rows are removed by retention cleanup, never by business
//! logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::maintenance::MaintenanceWindow;
use crate::state_machine::ActionState;

/// Largest permitted action weight; weights order multi-action delivery.
pub const MAX_ACTION_WEIGHT: i32 = 1000;

/// How aggressively the device should apply the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Install immediately, no user interaction
    Forced,
    /// Device/user may defer the installation
    Soft,
    /// Soft until the forced time passes, then forced
    TimeForced,
    /// Download artifacts but never install
    DownloadOnly,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::Soft => write!(f, "soft"),
            Self::TimeForced => write!(f, "time_forced"),
            Self::DownloadOnly => write!(f, "download_only"),
        }
    }
}

impl Default for ActionType {
    fn default() -> Self {
        Self::Forced
    }
}

/// A single target/distribution-set assignment in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub tenant: String,
    pub target_id: i64,
    pub distribution_set_id: i64,
    pub action_type: ActionType,
    pub status: ActionState,
    /// Moment a TIME_FORCED action turns forced
    pub forced_time: Option<DateTime<Utc>>,
    /// Install gate; download is always allowed
    pub maintenance_window: Option<MaintenanceWindow>,
    /// Delivery ordering weight, 0..=1000, higher first
    pub weight: i32,
    /// Back-reference when created by a rollout (id only, re-fetch via store)
    pub rollout_id: Option<i64>,
    pub rollout_group_id: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New action for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAction {
    pub target_id: i64,
    pub distribution_set_id: i64,
    pub action_type: ActionType,
    pub forced_time: Option<DateTime<Utc>>,
    pub maintenance_window: Option<MaintenanceWindow>,
    pub weight: i32,
    pub rollout_id: Option<i64>,
    pub rollout_group_id: Option<i64>,
}

impl Action {
    /// Whether the action occupies the target's active-action slot.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether the action belongs to a rollout group.
    pub fn is_rollout_action(&self) -> bool {
        self.rollout_group_id.is_some()
    }

    /// Whether the update must be applied without deferral at `now`.
    ///
    /// TIME_FORCED actions act soft until their forced time passes.
    pub fn is_forced_at(&self, now: DateTime<Utc>) -> bool {
        match self.action_type {
            ActionType::Forced => true,
            ActionType::TimeForced => self.forced_time.map(|t| t <= now).unwrap_or(true),
            ActionType::Soft | ActionType::DownloadOnly => false,
        }
    }

    /// Whether the device should only download, never install.
    pub fn is_download_only(&self) -> bool {
        self.action_type == ActionType::DownloadOnly
    }

    /// Whether an install notification must wait for a maintenance window.
    pub fn has_maintenance_window(&self) -> bool {
        self.maintenance_window.is_some()
    }
}
