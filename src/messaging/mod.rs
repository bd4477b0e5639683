//! # Message Transport
//!
//! Queue transport between the server and device connectors, abstracted
//! behind [`MessageBroker`] so an AMQP or pgmq implementation can be
//! swapped in. Delivery is at-least-once: consumers settle every claimed
//! message by ack, requeue or dead-letter.

pub mod broker;
pub mod errors;
pub mod memory;

pub use broker::{DeadLetter, Delivery, MessageBroker};
pub use errors::{BrokerError, BrokerResult};
pub use memory::InMemoryBroker;
