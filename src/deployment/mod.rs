//! Action lifecycle: assignment, cancellation and device-reported
//! status ingestion.

pub mod manager;

pub use manager::{AssignmentRequest, DeploymentManager};
