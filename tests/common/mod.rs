//! Shared fixtures for integration tests.
//!
//! Tests drive the service deterministically: the receiver and ticker
//! loops are never spawned, inbound messages are pumped with
//! `poll_once` and engine ticks are triggered with `tick_all`.

// Each test binary compiles its own copy; not all of them use every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use updraft_core::config::UpdraftConfig;
use updraft_core::context::RequestContext;
use updraft_core::dmf::{
    ActionStatusUpdate, DeviceActionStatus, MessageEnvelope, MessageTopic, MessageType,
    ThingCreatedBody,
};
use updraft_core::models::{
    Artifact, ArtifactHashes, NewDistributionSet, NewTarget, SoftwareModule,
};
use updraft_core::service::UpdraftService;
use updraft_core::{EntityStore, InMemoryBroker, InMemoryStore, MessageBroker};

pub const TENANT: &str = "default";

/// Service assembled on in-memory backends, with the concrete backend
/// handles kept around for queue and store inspection.
pub struct Harness {
    pub service: UpdraftService,
    pub store: Arc<InMemoryStore>,
    pub broker: Arc<InMemoryBroker>,
}

pub async fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    let service = UpdraftService::new(UpdraftConfig::default(), store.clone(), broker.clone())
        .await
        .expect("default config must assemble");
    Harness {
        service,
        store,
        broker,
    }
}

impl Harness {
    pub fn outbound_queue(&self) -> &str {
        &self.service.config().outbound_queue
    }

    pub fn inbound_queue(&self) -> &str {
        &self.service.config().inbound_queue
    }

    /// Publish one inbound message and pump the receiver once.
    pub async fn deliver(&self, message: MessageEnvelope) {
        self.broker
            .publish(self.inbound_queue(), message)
            .await
            .unwrap();
        assert!(self.service.receiver().poll_once().await);
    }

    /// Pump the receiver until the inbound queue reads empty.
    pub async fn pump_receiver(&self) {
        while self.service.receiver().poll_once().await {}
    }

    /// Remove and return everything queued for devices.
    pub fn drain_outbound(&self) -> Vec<MessageEnvelope> {
        self.broker.drain(self.outbound_queue())
    }

    /// Register `count` targets named `device-000`.. directly in the store.
    pub async fn seed_fleet(&self, count: usize) {
        for i in 0..count {
            self.store
                .create_target(TENANT, NewTarget::new(format!("device-{i:03}")), "system")
                .await
                .unwrap();
        }
    }

    /// One complete distribution set with a single os module.
    pub async fn seed_distribution_set(&self, name: &str, version: &str) -> i64 {
        let set = self
            .store
            .create_distribution_set(
                TENANT,
                NewDistributionSet {
                    name: name.to_string(),
                    version: version.to_string(),
                    modules: vec![SoftwareModule {
                        id: 1,
                        name: format!("{name}-os"),
                        version: version.to_string(),
                        module_type: "os".to_string(),
                        artifacts: vec![Artifact {
                            id: 1,
                            filename: format!("{name}-{version}.bin"),
                            size: 1 << 20,
                            hashes: ArtifactHashes {
                                md5: "d41d8cd9".to_string(),
                                sha1: "da39a3ee".to_string(),
                                sha256: "e3b0c442".to_string(),
                            },
                        }],
                    }],
                    complete: true,
                },
                "it-admin",
            )
            .await
            .unwrap();
        set.id
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new(TENANT, "it-admin")
}

pub fn thing_created(thing_id: &str, attributes: Option<HashMap<String, String>>) -> MessageEnvelope {
    MessageEnvelope::of_type(
        MessageType::ThingCreated,
        TENANT,
        thing_id,
        serde_json::to_value(ThingCreatedBody {
            name: None,
            attributes,
        })
        .unwrap(),
    )
}

pub fn status_update(thing_id: &str, action_id: i64, status: DeviceActionStatus) -> MessageEnvelope {
    MessageEnvelope::event(
        TENANT,
        thing_id,
        MessageTopic::UpdateActionStatus,
        &ActionStatusUpdate {
            action_id,
            status,
            messages: vec![format!("device reported {status:?}")],
            software_module_id: None,
        },
    )
    .unwrap()
}
