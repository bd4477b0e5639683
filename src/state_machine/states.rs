use serde::{Deserialize, Serialize};
use std::fmt;

/// Action status codes as reported through the device protocol and
/// recorded in the action status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Initial state when the action is created
    Scheduled,
    /// Action has been handed to the device for processing
    Running,
    /// Device reported that the download has started
    Download,
    /// Device reported that all artifacts are downloaded
    Downloaded,
    /// Device confirmed retrieval of the update instruction
    Retrieved,
    /// Device reported a non-fatal warning
    Warning,
    /// Cancellation was requested and awaits device acknowledgment
    Canceling,
    /// Device acknowledged the cancellation
    Canceled,
    /// Update applied successfully
    Finished,
    /// Update failed on the device
    Error,
}

impl ActionState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Canceled)
    }

    /// Check if the action still occupies the target's active-action slot
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Check if the state sits on the running branch of the lifecycle,
    /// where devices may report download progress and informational codes
    /// in any order.
    pub fn is_running_branch(&self) -> bool {
        matches!(
            self,
            Self::Running | Self::Download | Self::Downloaded | Self::Retrieved | Self::Warning
        )
    }

    /// Check if cancellation has been requested but not yet acknowledged
    pub fn is_canceling(&self) -> bool {
        matches!(self, Self::Canceling)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Download => write!(f, "download"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Retrieved => write!(f, "retrieved"),
            Self::Warning => write!(f, "warning"),
            Self::Canceling => write!(f, "canceling"),
            Self::Canceled => write!(f, "canceled"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ActionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "download" => Ok(Self::Download),
            "downloaded" => Ok(Self::Downloaded),
            "retrieved" => Ok(Self::Retrieved),
            "warning" => Ok(Self::Warning),
            "canceling" => Ok(Self::Canceling),
            "canceled" => Ok(Self::Canceled),
            "finished" => Ok(Self::Finished),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid action state: {s}")),
        }
    }
}

impl Default for ActionState {
    fn default() -> Self {
        Self::Scheduled
    }
}

/// Rollout campaign state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutState {
    /// Group membership is being materialized
    Creating,
    /// Groups are materialized, waiting for start
    Ready,
    /// Waiting for an operator approval decision
    WaitingForApproval,
    /// An operator denied the rollout
    ApprovalDenied,
    /// Start was requested, first group activation pending
    Starting,
    /// Groups are being processed
    Running,
    /// Paused by an operator or an error-threshold breach
    Paused,
    /// All groups reached a terminal state
    Finished,
    /// Forcefully stopped by an operator
    Stopped,
    /// Deletion requested, child actions are being cancelled
    Deleting,
    /// Soft-delete tombstone after cleanup
    Deleted,
}

impl RolloutState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Deleted)
    }

    /// Check if the scheduler tick should look at this rollout
    pub fn needs_handling(&self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Starting | Self::Running | Self::Deleting
        )
    }

    /// Check if the rollout accepts a start request
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Ready => write!(f, "ready"),
            Self::WaitingForApproval => write!(f, "waiting_for_approval"),
            Self::ApprovalDenied => write!(f, "approval_denied"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Finished => write!(f, "finished"),
            Self::Stopped => write!(f, "stopped"),
            Self::Deleting => write!(f, "deleting"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for RolloutState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "ready" => Ok(Self::Ready),
            "waiting_for_approval" => Ok(Self::WaitingForApproval),
            "approval_denied" => Ok(Self::ApprovalDenied),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "finished" => Ok(Self::Finished),
            "stopped" => Ok(Self::Stopped),
            "deleting" => Ok(Self::Deleting),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid rollout state: {s}")),
        }
    }
}

impl Default for RolloutState {
    fn default() -> Self {
        Self::Creating
    }
}

/// Rollout group state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutGroupState {
    /// Created, predecessor group not yet finished
    Scheduled,
    /// Eligible for activation on the next tick
    Ready,
    /// Actions created, waiting for device results
    Running,
    /// Success condition met
    Finished,
    /// Error threshold breached
    Error,
}

impl RolloutGroupState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    /// Check if a successor group may activate behind this one.
    ///
    /// An errored group whose error action lets the rollout continue is
    /// treated as done for sequencing purposes.
    pub fn unblocks_successor(&self) -> bool {
        self.is_terminal()
    }

    /// Check if the group can still be activated
    pub fn is_activatable(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Ready)
    }
}

impl fmt::Display for RolloutGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for RolloutGroupState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "ready" => Ok(Self::Ready),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid rollout group state: {s}")),
        }
    }
}

impl Default for RolloutGroupState {
    fn default() -> Self {
        Self::Scheduled
    }
}
