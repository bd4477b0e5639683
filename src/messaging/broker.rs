//! Broker seam for protocol message transport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dmf::MessageEnvelope;
use crate::messaging::errors::BrokerResult;

/// One claimed message plus its delivery metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Broker-assigned id, valid until acked or dead-lettered
    pub id: i64,
    /// Number of previous delivery attempts; 0 on first delivery
    pub redelivery_count: u32,
    pub envelope: MessageEnvelope,
}

/// A message parked after permanent handling failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub delivery: Delivery,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Queue transport with at-least-once delivery.
///
/// A consumed message stays claimed (invisible to other consumers) until
/// the consumer settles it with [`ack`](MessageBroker::ack),
/// [`requeue`](MessageBroker::requeue) or
/// [`dead_letter`](MessageBroker::dead_letter). Publishing creates
/// queues on first use; consuming an unknown queue reads as empty.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, queue: &str, envelope: MessageEnvelope) -> BrokerResult<()>;

    /// Claim the next message, or `None` when the queue is empty.
    async fn consume(&self, queue: &str) -> BrokerResult<Option<Delivery>>;

    /// Settle a claimed message as handled.
    async fn ack(&self, queue: &str, delivery_id: i64) -> BrokerResult<()>;

    /// Return a claimed message for redelivery; its redelivery count
    /// increases by one.
    async fn requeue(&self, queue: &str, delivery_id: i64) -> BrokerResult<()>;

    /// Park a claimed message in the queue's dead-letter store.
    async fn dead_letter(&self, queue: &str, delivery_id: i64, reason: &str) -> BrokerResult<()>;
}
