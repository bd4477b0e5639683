//! # Service Bootstrap
//!
//! Wires the store, the broker, the event dispatcher and the protocol
//! components into one runnable handle. Works the same whether the
//! service is embedded in a larger application or run standalone:
//! build, start, and shut down.
//!
//! ## Key Features
//!
//! - **Shared Wiring**: every component sees the same store, broker and
//!   event dispatcher
//! - **Lifecycle Management**: start/shutdown with cooperative worker
//!   termination over a watch channel
//! - **Pluggable Backends**: any [`EntityStore`] and [`MessageBroker`]
//!   implementation; [`in_memory`](UpdraftService::in_memory) bundles
//!   the built-in ones

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::UpdraftConfig;
use crate::deployment::DeploymentManager;
use crate::dispatch::ProtocolDispatcher;
use crate::error::UpdraftResult;
use crate::events::EventDispatcher;
use crate::messaging::{InMemoryBroker, MessageBroker};
use crate::receiver::ProtocolReceiver;
use crate::rollout::{RolloutEngine, RolloutManagement};
use crate::scheduler::RolloutTicker;
use crate::store::{EntityStore, InMemoryStore};

/// Running assembly of all service components.
pub struct UpdraftService {
    config: UpdraftConfig,
    store: Arc<dyn EntityStore>,
    broker: Arc<dyn MessageBroker>,
    events: Arc<EventDispatcher>,
    deployment: Arc<DeploymentManager>,
    management: Arc<RolloutManagement>,
    engine: Arc<RolloutEngine>,
    receiver: Arc<ProtocolReceiver>,
    ticker: Arc<RolloutTicker>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl UpdraftService {
    /// Assemble the service on top of the given backends.
    pub async fn new(
        config: UpdraftConfig,
        store: Arc<dyn EntityStore>,
        broker: Arc<dyn MessageBroker>,
    ) -> UpdraftResult<Self> {
        config.validate()?;
        crate::logging::init_structured_logging();

        let events = Arc::new(EventDispatcher::new(config.event_capacity));
        let deployment = Arc::new(DeploymentManager::new(store.clone(), events.clone()));
        let management = Arc::new(RolloutManagement::new(
            store.clone(),
            deployment.clone(),
            events.clone(),
        ));
        let engine = Arc::new(RolloutEngine::new(
            store.clone(),
            deployment.clone(),
            events.clone(),
        ));

        let dispatcher = Arc::new(ProtocolDispatcher::new(
            store.clone(),
            broker.clone(),
            config.outbound_queue.clone(),
            config.artifact_base_url.clone(),
        ));
        dispatcher.attach(&events).await;

        let receiver = Arc::new(ProtocolReceiver::new(
            store.clone(),
            broker.clone(),
            deployment.clone(),
            events.clone(),
            config.receiver_settings(),
        ));
        let ticker = Arc::new(RolloutTicker::new(
            store.clone(),
            engine.clone(),
            config.tick_interval(),
        ));

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            broker,
            events,
            deployment,
            management,
            engine,
            receiver,
            ticker,
            shutdown,
            workers: Vec::new(),
        })
    }

    /// Assemble the service on the bundled in-memory backends.
    pub async fn in_memory(config: UpdraftConfig) -> UpdraftResult<Self> {
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new());
        let broker: Arc<dyn MessageBroker> = Arc::new(InMemoryBroker::new());
        Self::new(config, store, broker).await
    }

    /// Spawn the receiver and ticker loops. Idempotent while running.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("service already started");
            return;
        }
        // A fresh start after shutdown needs the flag reset.
        let _ = self.shutdown.send(false);

        self.workers
            .push(tokio::spawn(self.receiver.clone().run(self.shutdown.subscribe())));
        self.workers
            .push(tokio::spawn(self.ticker.clone().run(self.shutdown.subscribe())));

        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            inbound_queue = %self.config.inbound_queue,
            outbound_queue = %self.config.outbound_queue,
            "🚀 service started"
        );
    }

    /// Signal the worker loops to stop and wait for them to finish.
    pub async fn shutdown(&mut self) {
        if self.workers.is_empty() {
            warn!("service already stopped");
            return;
        }
        let _ = self.shutdown.send(true);
        futures::future::join_all(self.workers.drain(..)).await;
        info!("🛑 service stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn config(&self) -> &UpdraftConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn EntityStore> {
        self.store.clone()
    }

    pub fn broker(&self) -> Arc<dyn MessageBroker> {
        self.broker.clone()
    }

    pub fn events(&self) -> Arc<EventDispatcher> {
        self.events.clone()
    }

    pub fn deployment(&self) -> Arc<DeploymentManager> {
        self.deployment.clone()
    }

    pub fn rollouts(&self) -> Arc<RolloutManagement> {
        self.management.clone()
    }

    pub fn engine(&self) -> Arc<RolloutEngine> {
        self.engine.clone()
    }

    pub fn receiver(&self) -> Arc<ProtocolReceiver> {
        self.receiver.clone()
    }

    pub fn ticker(&self) -> Arc<RolloutTicker> {
        self.ticker.clone()
    }
}
