//! # Core Error Types
//!
//! Structured error handling for the rollout engine and the device
//! protocol using thiserror instead of `Box<dyn Error>` patterns.
//!
//! Every error carries a disposition used by the protocol receiver to
//! decide between redelivery and dead-lettering: validation and conflict
//! errors are permanent (a retry with the same message cannot succeed),
//! infrastructure errors are transient and retryable.

use thiserror::Error;

/// How a failed inbound message should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Permanent failure: route the message to the dead-letter queue.
    DeadLetter,
    /// Transient failure: requeue the message for redelivery.
    Requeue,
}

/// Central error type for deployment, rollout and protocol operations.
#[derive(Error, Debug)]
pub enum UpdraftError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid maintenance schedule '{schedule}': {reason}")]
    InvalidMaintenanceSchedule { schedule: String, reason: String },

    #[error("Invalid maintenance duration '{duration}': expected hh:mm:ss")]
    InvalidMaintenanceDuration { duration: String },

    #[error("Invalid maintenance timezone '{timezone}': expected a UTC offset like +02:00")]
    InvalidMaintenanceTimezone { timezone: String },

    #[error("Invalid target filter '{query}': {reason}")]
    InvalidFilter { query: String, reason: String },

    #[error("Target {controller_id} already has an active action and multi-assignment is not enabled for this tenant")]
    MultiAssignmentNotEnabled { controller_id: String },

    #[error("{entity} {id} not found")]
    EntityNotFound { entity: &'static str, id: String },

    #[error("{entity} {key} already exists")]
    EntityAlreadyExists { entity: &'static str, key: String },

    #[error("Action {action_id}: illegal status transition {from} -> {to}")]
    InvalidActionTransition {
        action_id: i64,
        from: String,
        to: String,
    },

    #[error("Rollout {rollout_id}: illegal status transition {from} -> {to}")]
    InvalidRolloutTransition {
        rollout_id: i64,
        from: String,
        to: String,
    },

    #[error("Action {action_id} is already closed")]
    ActionAlreadyClosed { action_id: i64 },

    #[error("Tenant mismatch: message is for '{message_tenant}', entity belongs to '{entity_tenant}'")]
    TenantMismatch {
        message_tenant: String,
        entity_tenant: String,
    },

    #[error("Distribution set {id} is locked by a running action and cannot be modified")]
    DistributionSetLocked { id: i64 },

    #[error("Distribution set {id} is incomplete and cannot be assigned")]
    IncompleteDistributionSet { id: i64 },

    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    #[error("Entity store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Message broker unavailable: {message}")]
    BrokerUnavailable { message: String },

    #[error("Operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl UpdraftError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::EntityNotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(entity: &'static str, key: impl ToString) -> Self {
        Self::EntityAlreadyExists {
            entity,
            key: key.to_string(),
        }
    }

    /// Create a malformed-message error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Create a store-unavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a redelivery of the triggering message could succeed.
    ///
    /// Only infrastructure failures are retryable; validation and conflict
    /// errors are deterministic and would fail identically on every
    /// redelivery attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::BrokerUnavailable { .. } | Self::Timeout { .. }
        )
    }

    /// Routing decision for a message whose handler returned this error.
    pub fn disposition(&self) -> ErrorDisposition {
        if self.is_retryable() {
            ErrorDisposition::Requeue
        } else {
            ErrorDisposition::DeadLetter
        }
    }
}

impl From<serde_json::Error> for UpdraftError {
    fn from(err: serde_json::Error) -> Self {
        UpdraftError::malformed(err.to_string())
    }
}

/// Result type alias for core operations
pub type UpdraftResult<T> = std::result::Result<T, UpdraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(UpdraftError::store_unavailable("connection refused").is_retryable());
        assert!(UpdraftError::timeout("broker_publish", 5000).is_retryable());

        assert!(!UpdraftError::malformed("truncated body").is_retryable());
        assert!(!UpdraftError::not_found("Action", 42).is_retryable());
        assert!(!UpdraftError::MultiAssignmentNotEnabled {
            controller_id: "device-1".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_disposition_routing() {
        assert_eq!(
            UpdraftError::store_unavailable("down").disposition(),
            ErrorDisposition::Requeue
        );
        assert_eq!(
            UpdraftError::already_exists("Target", "device-1").disposition(),
            ErrorDisposition::DeadLetter
        );
    }

    #[test]
    fn test_error_display() {
        let err = UpdraftError::InvalidActionTransition {
            action_id: 7,
            from: "finished".to_string(),
            to: "running".to_string(),
        };
        let display = format!("{err}");
        assert!(display.contains("Action 7"));
        assert!(display.contains("finished -> running"));
    }

    #[test]
    fn test_json_error_is_malformed() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: UpdraftError = json_err.into();
        assert!(matches!(err, UpdraftError::MalformedMessage { .. }));
        assert_eq!(err.disposition(), ErrorDisposition::DeadLetter);
    }
}
