//! Staged rollout campaigns: operator-facing management, the pure
//! partitioning and threshold evaluator, and the tick-driven engine.

pub mod engine;
pub mod evaluator;
pub mod management;

pub use engine::{RolloutEngine, TickReport};
pub use evaluator::GroupVerdict;
pub use management::RolloutManagement;
