//! # Domain Models
//!
//! Entity types persisted through the [`crate::store::EntityStore`]
//! seam: targets, distribution sets, actions with their status history,
//! rollouts with their groups, and per-tenant configuration.
//!
//! Models are plain data plus small derived predicates; lifecycle rules
//! live in `state_machine` and the managers that enforce them.

pub mod action;
pub mod action_status;
pub mod distribution_set;
pub mod rollout;
pub mod rollout_group;
pub mod target;
pub mod tenant;

// Re-export core models for easy access
pub use action::{Action, ActionType, NewAction, MAX_ACTION_WEIGHT};
pub use action_status::{ActionStatus, NewActionStatus};
pub use distribution_set::{
    Artifact, ArtifactHashes, DistributionSet, NewDistributionSet, SoftwareModule,
};
pub use rollout::{NewRollout, Rollout};
pub use rollout_group::{
    ErrorAction, ErrorCondition, GroupSpec, RolloutGroup, SuccessCondition, ThresholdMode,
};
pub use target::{AttributeUpdateMode, NewTarget, Target, TargetUpdateStatus};
pub use tenant::{
    TenantConfiguration, ACTION_WEIGHT_DEFAULT, MULTI_ASSIGNMENTS_ENABLED,
    ROLLOUT_APPROVAL_ENABLED,
};
