//! Message envelope and header vocabulary for the device federation
//! protocol.
//!
//! Every queue message is one [`MessageEnvelope`]: typed headers plus a
//! JSON body. Bodies are decoded lazily with [`MessageEnvelope::body_as`]
//! so malformed payloads surface as typed errors at the consumer, not as
//! transport failures.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::UpdraftResult;

/// Message class header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Carries a topic header selecting the concrete operation
    Event,
    ThingCreated,
    ThingDeleted,
    Ping,
    PingResponse,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "EVENT"),
            Self::ThingCreated => write!(f, "THING_CREATED"),
            Self::ThingDeleted => write!(f, "THING_DELETED"),
            Self::Ping => write!(f, "PING"),
            Self::PingResponse => write!(f, "PING_RESPONSE"),
        }
    }
}

/// Operation selector for `EVENT` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageTopic {
    // Server -> device
    Download,
    DownloadAndInstall,
    CancelDownload,
    MultiAction,
    RequestAttributesUpdate,
    Delete,
    PingResponse,
    // Device -> server
    UpdateActionStatus,
    UpdateAttributes,
}

impl fmt::Display for MessageTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "DOWNLOAD"),
            Self::DownloadAndInstall => write!(f, "DOWNLOAD_AND_INSTALL"),
            Self::CancelDownload => write!(f, "CANCEL_DOWNLOAD"),
            Self::MultiAction => write!(f, "MULTI_ACTION"),
            Self::RequestAttributesUpdate => write!(f, "REQUEST_ATTRIBUTES_UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::PingResponse => write!(f, "PING_RESPONSE"),
            Self::UpdateActionStatus => write!(f, "UPDATE_ACTION_STATUS"),
            Self::UpdateAttributes => write!(f, "UPDATE_ATTRIBUTES"),
        }
    }
}

/// One protocol message: headers plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Present on `EVENT` messages only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<MessageTopic>,
    /// Device controller id the message concerns
    pub thing_id: String,
    pub tenant: String,
    /// Fresh per transmission; redeliveries of the same intent carry new
    /// ids, action ids make device handling idempotent
    pub message_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl MessageEnvelope {
    /// Build an `EVENT` message with a serialized body.
    pub fn event(
        tenant: impl Into<String>,
        thing_id: impl Into<String>,
        topic: MessageTopic,
        body: &impl Serialize,
    ) -> UpdraftResult<Self> {
        Ok(Self {
            message_type: MessageType::Event,
            topic: Some(topic),
            thing_id: thing_id.into(),
            tenant: tenant.into(),
            message_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            body: serde_json::to_value(body)?,
        })
    }

    /// Build a topic-less message (`THING_CREATED`, `PING`, ...).
    pub fn of_type(
        message_type: MessageType,
        tenant: impl Into<String>,
        thing_id: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            message_type,
            topic: None,
            thing_id: thing_id.into(),
            tenant: tenant.into(),
            message_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            body,
        }
    }

    /// Decode the body into a typed payload.
    pub fn body_as<T: DeserializeOwned>(&self) -> UpdraftResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Short human form for logs: `EVENT/DOWNLOAD_AND_INSTALL -> device-1`.
    pub fn describe(&self) -> String {
        match self.topic {
            Some(topic) => format!("{}/{} -> {}", self.message_type, topic, self.thing_id),
            None => format!("{} -> {}", self.message_type, self.thing_id),
        }
    }
}
