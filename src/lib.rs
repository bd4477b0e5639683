#![allow(clippy::doc_markdown)] // Allow technical terms like AMQP, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Updraft Core
//!
//! Staged software-rollout orchestration for device fleets.
//!
//! ## Overview
//!
//! Updraft rolls firmware and software updates out to large device
//! fleets in stages. A rollout splits its matched targets into ordered
//! groups; each group must clear a success threshold before the next
//! one starts, and an error threshold pauses the campaign before a bad
//! update reaches the whole fleet. Devices are driven over an
//! asynchronous message protocol with per-device serialization and
//! poison-message isolation.
//!
//! ## Architecture
//!
//! The periodic [`scheduler`] ticks the [`rollout`] engine, which
//! evaluates group thresholds and hands due targets to the
//! [`deployment`] manager. Every lifecycle change is published on the
//! [`events`] dispatcher; the [`dispatch`] side converts those events
//! into protocol messages while the [`receiver`] side folds device
//! feedback back into action state. Persistence and transport sit
//! behind the [`store`] and [`messaging`] seams.
//!
//! ## Key Features
//!
//! - **Staged Rollouts**: percentage-based group partitioning with
//!   success and error thresholds evaluated per tick
//! - **Full Action Lifecycle**: assignment, cancellation, force-quit
//!   and device status feedback behind one state machine
//! - **Multi-Assignment**: weighted concurrent actions per device,
//!   bundled into ordered multi-action messages
//! - **Maintenance Windows**: cron-scheduled install gating with
//!   reopening detection on every tick
//! - **Poison-Message Isolation**: malformed or unprocessable device
//!   messages are dead-lettered without stalling their queue
//!
//! ## Module Organization
//!
//! - [`models`] - Domain entities: targets, actions, distribution sets,
//!   rollouts and groups
//! - [`store`] - Persistence seam and the bundled in-memory store
//! - [`state_machine`] - Lifecycle states and transition tables
//! - [`rollout`] - Campaign management, partitioning and the tick engine
//! - [`deployment`] - Assignment and action lifecycle management
//! - [`dmf`] - Device messaging format envelopes and bodies
//! - [`messaging`] - Broker seam with at-least-once delivery
//! - [`dispatch`] / [`receiver`] - Outbound and inbound protocol sides
//! - [`scheduler`] - Per-tenant periodic ticking
//! - [`service`] - Bootstrap wiring all components together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use updraft_core::config::UpdraftConfig;
//! use updraft_core::service::UpdraftService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Assemble the service on the bundled in-memory backends
//! let mut service = UpdraftService::in_memory(UpdraftConfig::default()).await?;
//! service.start();
//!
//! // Rollouts now tick and protocol messages flow; create entities
//! // through service.rollouts() and service.deployment().
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod deployment;
pub mod dispatch;
pub mod dmf;
pub mod error;
pub mod events;
pub mod filter;
pub mod logging;
pub mod maintenance;
pub mod messaging;
pub mod models;
pub mod receiver;
pub mod rollout;
pub mod scheduler;
pub mod service;
pub mod state_machine;
pub mod store;

pub use config::UpdraftConfig;
pub use context::RequestContext;
pub use deployment::{AssignmentRequest, DeploymentManager};
pub use error::{UpdraftError, UpdraftResult};
pub use events::{DomainEvent, EventDispatcher, EventKind};
pub use messaging::{InMemoryBroker, MessageBroker};
pub use rollout::{RolloutEngine, RolloutManagement, TickReport};
pub use service::UpdraftService;
pub use store::{EntityStore, InMemoryStore};
