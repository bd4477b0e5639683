//! # Device Management Federation Protocol
//!
//! Wire-level contract spoken with device-side connectors over the
//! message broker. The server publishes update instructions to a
//! per-protocol outbound queue and consumes device lifecycle reports
//! from an inbound queue; all payloads are JSON.
//!
//! This module is pure data: envelopes, header vocabularies and typed
//! bodies. Sending lives in `dispatch`, receiving in `receiver`.

pub mod bodies;
pub mod envelope;

pub use bodies::{
    ActionStatusUpdate, ArtifactPayload, AttributeUpdate, CancelRequest, DeviceActionStatus,
    DownloadRequest, MultiActionElement, MultiActionRequest, PingResponse,
    SoftwareModulePayload, ThingCreatedBody,
};
pub use envelope::{MessageEnvelope, MessageTopic, MessageType};
