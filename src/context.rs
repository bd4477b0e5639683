//! Per-call request context.
//!
//! Every management and protocol operation receives an explicit
//! [`RequestContext`] instead of reading tenant or principal from ambient
//! state. Protocol-driven operations use [`RequestContext::system`] with
//! the tenant taken from the message envelope.

use serde::{Deserialize, Serialize};

/// Principal used for operations triggered by the system itself
/// (scheduler ticks, protocol message handling).
pub const SYSTEM_PRINCIPAL: &str = "system";

/// Identifies the tenant and acting principal for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Tenant the operation runs under
    pub tenant: String,
    /// Acting user or subsystem, recorded on created entities
    pub principal: String,
}

impl RequestContext {
    /// Context for an operation performed by a named principal.
    pub fn new(tenant: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            principal: principal.into(),
        }
    }

    /// Context for system-initiated operations (ticks, inbound messages).
    pub fn system(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            principal: SYSTEM_PRINCIPAL.to_string(),
        }
    }
}
