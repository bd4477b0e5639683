// State machine module for the rollout and deployment lifecycles
//
// Holds the state enums for actions, rollouts and rollout groups plus the
// transition tables enforced by the lifecycle managers.

pub mod states;
pub mod transitions;

// Re-export main types for convenient access
pub use states::{ActionState, RolloutGroupState, RolloutState};
pub use transitions::{
    action_transition_allowed, group_transition_allowed, rollout_transition_allowed,
};
