//! Typed domain events emitted by the deployment manager, the rollout
//! engine and the protocol receiver.
//!
//! Events are facts about committed state changes; they are published
//! after the store write succeeds and consumed by the protocol
//! dispatcher (device messaging) and any UI subscriber.

use serde::{Deserialize, Serialize};

use crate::state_machine::{ActionState, RolloutGroupState, RolloutState};

/// Event kind, used as the dispatcher's routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ActionCreated,
    ActionUpdated,
    ActionCanceled,
    ActionWindowOpened,
    TargetPoll,
    TargetUpdated,
    TargetDeleted,
    TargetAttributesRequested,
    RolloutCreated,
    RolloutUpdated,
    RolloutGroupUpdated,
}

/// A committed state change, with enough identity for consumers to
/// re-read current truth from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A new action was created and promoted for delivery.
    ActionCreated {
        tenant: String,
        action_id: i64,
        target_id: i64,
        controller_id: String,
    },
    /// An action accepted a status transition.
    ActionUpdated {
        tenant: String,
        action_id: i64,
        target_id: i64,
        controller_id: String,
        status: ActionState,
    },
    /// A cancellation was requested for an action.
    ActionCanceled {
        tenant: String,
        action_id: i64,
        target_id: i64,
        controller_id: String,
    },
    /// A deferred action's maintenance window opened.
    ActionWindowOpened {
        tenant: String,
        action_id: i64,
        target_id: i64,
        controller_id: String,
    },
    /// A device made contact; pending work should be re-sent.
    TargetPoll { tenant: String, controller_id: String },
    /// Target metadata or attributes changed.
    TargetUpdated {
        tenant: String,
        target_id: i64,
        controller_id: String,
    },
    /// A target was deleted.
    TargetDeleted {
        tenant: String,
        target_id: i64,
        controller_id: String,
    },
    /// The server wants a fresh attribute snapshot from the device.
    TargetAttributesRequested {
        tenant: String,
        target_id: i64,
        controller_id: String,
    },
    RolloutCreated { tenant: String, rollout_id: i64 },
    RolloutUpdated {
        tenant: String,
        rollout_id: i64,
        status: RolloutState,
    },
    RolloutGroupUpdated {
        tenant: String,
        rollout_id: i64,
        group_id: i64,
        status: RolloutGroupState,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ActionCreated { .. } => EventKind::ActionCreated,
            Self::ActionUpdated { .. } => EventKind::ActionUpdated,
            Self::ActionCanceled { .. } => EventKind::ActionCanceled,
            Self::ActionWindowOpened { .. } => EventKind::ActionWindowOpened,
            Self::TargetPoll { .. } => EventKind::TargetPoll,
            Self::TargetUpdated { .. } => EventKind::TargetUpdated,
            Self::TargetDeleted { .. } => EventKind::TargetDeleted,
            Self::TargetAttributesRequested { .. } => EventKind::TargetAttributesRequested,
            Self::RolloutCreated { .. } => EventKind::RolloutCreated,
            Self::RolloutUpdated { .. } => EventKind::RolloutUpdated,
            Self::RolloutGroupUpdated { .. } => EventKind::RolloutGroupUpdated,
        }
    }

    pub fn tenant(&self) -> &str {
        match self {
            Self::ActionCreated { tenant, .. }
            | Self::ActionUpdated { tenant, .. }
            | Self::ActionCanceled { tenant, .. }
            | Self::ActionWindowOpened { tenant, .. }
            | Self::TargetPoll { tenant, .. }
            | Self::TargetUpdated { tenant, .. }
            | Self::TargetDeleted { tenant, .. }
            | Self::TargetAttributesRequested { tenant, .. }
            | Self::RolloutCreated { tenant, .. }
            | Self::RolloutUpdated { tenant, .. }
            | Self::RolloutGroupUpdated { tenant, .. } => tenant,
        }
    }
}
