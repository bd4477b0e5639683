//! # Transition Tables
//!
//! Single source of truth for the action, rollout and rollout-group state
//! machines. The lifecycle managers consult these tables before persisting
//! any status change; an update that is not in the table is rejected as a
//! recoverable validation error and dropped without touching state.

use super::states::{ActionState, RolloutGroupState, RolloutState};

/// Check whether an action may move from `from` to `to`.
///
/// The running branch (RUNNING, DOWNLOAD, DOWNLOADED, RETRIEVED, WARNING)
/// is deliberately permissive: devices report download progress and
/// informational codes in whatever order their updater produces them.
/// Leaving the branch is only possible toward FINISHED, ERROR or
/// CANCELING. A CANCELING action is finalized by the device with CANCELED,
/// may still report the outcome of the original update (FINISHED/ERROR),
/// or may reject the cancellation and fall back to RUNNING.
pub fn action_transition_allowed(from: ActionState, to: ActionState) -> bool {
    if from.is_terminal() {
        return false;
    }

    match (from, to) {
        // Initial hand-over and early cancellation
        (ActionState::Scheduled, ActionState::Running) => true,
        (ActionState::Scheduled, ActionState::Canceling) => true,

        // Running branch: free movement within the branch
        (f, t) if f.is_running_branch() && t.is_running_branch() => true,

        // Running branch: terminal outcomes and cancellation intent
        (f, ActionState::Finished) if f.is_running_branch() => true,
        (f, ActionState::Error) if f.is_running_branch() => true,
        (f, ActionState::Canceling) if f.is_running_branch() => true,

        // Cancellation resolution
        (ActionState::Canceling, ActionState::Canceled) => true,
        (ActionState::Canceling, ActionState::Running) => true,
        (ActionState::Canceling, ActionState::Finished) => true,
        (ActionState::Canceling, ActionState::Error) => true,

        _ => false,
    }
}

/// Check whether a rollout may move from `from` to `to`.
///
/// STOPPED and DELETING are forced transitions reachable from any
/// non-deleted state; the rest follows the campaign flow.
pub fn rollout_transition_allowed(from: RolloutState, to: RolloutState) -> bool {
    if from == RolloutState::Deleted {
        return false;
    }

    // Forced terminal requests override the normal flow.
    if matches!(to, RolloutState::Stopped | RolloutState::Deleting) {
        return !matches!(from, RolloutState::Deleting | RolloutState::Stopped);
    }

    match (from, to) {
        (RolloutState::Creating, RolloutState::Ready) => true,
        (RolloutState::Creating, RolloutState::WaitingForApproval) => true,
        (RolloutState::Ready, RolloutState::Starting) => true,
        (RolloutState::WaitingForApproval, RolloutState::Ready) => true,
        (RolloutState::WaitingForApproval, RolloutState::ApprovalDenied) => true,
        (RolloutState::Starting, RolloutState::Running) => true,
        (RolloutState::Running, RolloutState::Paused) => true,
        (RolloutState::Running, RolloutState::Finished) => true,
        (RolloutState::Paused, RolloutState::Running) => true,
        (RolloutState::Deleting, RolloutState::Deleted) => true,
        _ => false,
    }
}

/// Check whether a rollout group may move from `from` to `to`.
pub fn group_transition_allowed(from: RolloutGroupState, to: RolloutGroupState) -> bool {
    match (from, to) {
        (RolloutGroupState::Scheduled, RolloutGroupState::Ready) => true,
        (RolloutGroupState::Scheduled, RolloutGroupState::Running) => true,
        (RolloutGroupState::Ready, RolloutGroupState::Running) => true,
        (RolloutGroupState::Running, RolloutGroupState::Finished) => true,
        (RolloutGroupState::Running, RolloutGroupState::Error) => true,
        _ => false,
    }
}
