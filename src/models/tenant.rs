//! # Tenant Configuration Model
//!
//! Per-tenant key/value settings read on every decision point. Values are
//! eventually consistent: a write must be visible to the next scheduler
//! tick and the next inbound message, nothing stronger.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key for the multi-assignment switch.
pub const MULTI_ASSIGNMENTS_ENABLED: &str = "multi.assignments.enabled";
/// Key for the rollout approval workflow switch.
pub const ROLLOUT_APPROVAL_ENABLED: &str = "rollout.approval.enabled";
/// Key for the default action weight.
pub const ACTION_WEIGHT_DEFAULT: &str = "action.weight.default";

/// Snapshot of one tenant's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantConfiguration {
    pub tenant: String,
    pub values: HashMap<String, String>,
}

impl TenantConfiguration {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            values: HashMap::new(),
        }
    }

    fn bool_value(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(default)
    }

    /// Whether targets may hold multiple concurrent active actions.
    pub fn multi_assignments_enabled(&self) -> bool {
        self.bool_value(MULTI_ASSIGNMENTS_ENABLED, false)
    }

    /// Whether new rollouts require an operator approval before starting.
    pub fn rollout_approval_enabled(&self) -> bool {
        self.bool_value(ROLLOUT_APPROVAL_ENABLED, false)
    }

    /// Weight assigned to actions created without an explicit weight.
    pub fn default_action_weight(&self) -> i32 {
        self.values
            .get(ACTION_WEIGHT_DEFAULT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000)
    }

    /// Set one configuration value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}
