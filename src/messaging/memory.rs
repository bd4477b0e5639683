//! # In-Memory Message Broker
//!
//! ## Overview
//!
//! Single-process [`MessageBroker`] with the at-least-once semantics of
//! a real queue broker: claimed messages stay invisible until settled,
//! requeues increment the redelivery count, dead-lettered messages are
//! retained for inspection.
//!
//! Used by the test suite and by single-node deployments where the
//! device connector runs in the same process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dmf::MessageEnvelope;
use crate::messaging::broker::{DeadLetter, Delivery, MessageBroker};
use crate::messaging::errors::{BrokerError, BrokerResult};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Delivery>,
    in_flight: HashMap<i64, Delivery>,
    dead: Vec<DeadLetter>,
}

/// Lock-per-call in-memory broker.
#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, QueueState>>,
    next_delivery_id: AtomicI64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently waiting in a queue.
    pub fn depth(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }

    /// Copy of the pending messages, oldest first, without claiming.
    pub fn snapshot(&self, queue: &str) -> Vec<MessageEnvelope> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.pending.iter().map(|d| d.envelope.clone()).collect())
            .unwrap_or_default()
    }

    /// Remove and return every pending message, oldest first.
    pub fn drain(&self, queue: &str) -> Vec<MessageEnvelope> {
        self.queues
            .lock()
            .get_mut(queue)
            .map(|q| q.pending.drain(..).map(|d| d.envelope).collect())
            .unwrap_or_default()
    }

    /// Dead-lettered messages of a queue, oldest first.
    pub fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.dead.clone())
            .unwrap_or_default()
    }

    fn take_in_flight(&self, queue: &str, delivery_id: i64, operation: &str) -> BrokerResult<Delivery> {
        let mut queues = self.queues.lock();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;
        state.in_flight.remove(&delivery_id).ok_or_else(|| {
            BrokerError::operation_failed(
                queue,
                operation,
                format!("no claimed delivery with id {delivery_id}"),
            )
        })
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, envelope: MessageEnvelope) -> BrokerResult<()> {
        let id = self.next_delivery_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(queue, message = %envelope.describe(), "📤 publishing message");
        let mut queues = self.queues.lock();
        queues
            .entry(queue.to_string())
            .or_default()
            .pending
            .push_back(Delivery {
                id,
                redelivery_count: 0,
                envelope,
            });
        Ok(())
    }

    async fn consume(&self, queue: &str) -> BrokerResult<Option<Delivery>> {
        let mut queues = self.queues.lock();
        let Some(state) = queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(delivery) = state.pending.pop_front() else {
            return Ok(None);
        };
        state.in_flight.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, queue: &str, delivery_id: i64) -> BrokerResult<()> {
        self.take_in_flight(queue, delivery_id, "ack")?;
        Ok(())
    }

    async fn requeue(&self, queue: &str, delivery_id: i64) -> BrokerResult<()> {
        let mut delivery = self.take_in_flight(queue, delivery_id, "requeue")?;
        delivery.redelivery_count += 1;
        debug!(
            queue,
            delivery_id,
            redelivery_count = delivery.redelivery_count,
            "requeueing message"
        );
        let mut queues = self.queues.lock();
        queues
            .entry(queue.to_string())
            .or_default()
            .pending
            .push_back(delivery);
        Ok(())
    }

    async fn dead_letter(&self, queue: &str, delivery_id: i64, reason: &str) -> BrokerResult<()> {
        let delivery = self.take_in_flight(queue, delivery_id, "dead_letter")?;
        warn!(
            queue,
            delivery_id,
            message = %delivery.envelope.describe(),
            reason,
            "☠️ dead-lettering message"
        );
        let mut queues = self.queues.lock();
        queues
            .entry(queue.to_string())
            .or_default()
            .dead
            .push(DeadLetter {
                delivery,
                reason: reason.to_string(),
                dead_lettered_at: Utc::now(),
            });
        Ok(())
    }
}
