//! Error types for broker operations.

use thiserror::Error;

use crate::error::UpdraftError;

/// Transport-level failures talking to the message broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    OperationFailed {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Message serialization error: {message}")]
    Serialization { message: String },
}

impl BrokerError {
    pub fn operation_failed(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Broker failures surface to the domain as transient infrastructure
/// errors, so message handling requeues instead of dead-lettering.
impl From<BrokerError> for UpdraftError {
    fn from(err: BrokerError) -> Self {
        UpdraftError::BrokerUnavailable {
            message: err.to_string(),
        }
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
