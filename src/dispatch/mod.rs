//! # Protocol Dispatcher
//!
//! ## Overview
//!
//! Turns domain events into outbound device messages. Assignment,
//! cancellation, window-opening and poll events all funnel into one
//! routine that dispatches the target's current pending set: a single
//! active action becomes a `DOWNLOAD`, `DOWNLOAD_AND_INSTALL` or
//! `CANCEL_DOWNLOAD` message, several active actions become one
//! `MULTI_ACTION` bundle. Re-dispatching the full current state makes
//! every message idempotent on the device side.
//!
//! ## Key Features
//!
//! - **Maintenance gating**: an action whose window is closed ships as
//!   `DOWNLOAD`; the engine re-triggers dispatch when the window opens
//! - **Deterministic bundle order**: weight descending, ties by action
//!   id ascending
//! - **Per-device artifact URLs**: module payloads carry download links
//!   scoped to tenant and controller id

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::dmf::{
    CancelRequest, DownloadRequest, MessageEnvelope, MessageTopic, MultiActionElement,
    MultiActionRequest, SoftwareModulePayload,
};
use crate::error::UpdraftResult;
use crate::events::{DomainEvent, EventDispatcher, EventHandler, EventKind};
use crate::messaging::MessageBroker;
use crate::models::Action;
use crate::store::EntityStore;

/// Events the dispatcher reacts to.
const SUBSCRIPTIONS: [EventKind; 6] = [
    EventKind::ActionCreated,
    EventKind::ActionCanceled,
    EventKind::ActionWindowOpened,
    EventKind::TargetPoll,
    EventKind::TargetDeleted,
    EventKind::TargetAttributesRequested,
];

pub struct ProtocolDispatcher {
    store: Arc<dyn EntityStore>,
    broker: Arc<dyn MessageBroker>,
    outbound_queue: String,
    artifact_base_url: String,
}

impl ProtocolDispatcher {
    pub fn new(
        store: Arc<dyn EntityStore>,
        broker: Arc<dyn MessageBroker>,
        outbound_queue: impl Into<String>,
        artifact_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            broker,
            outbound_queue: outbound_queue.into(),
            artifact_base_url: artifact_base_url.into(),
        }
    }

    /// Register this dispatcher for every event kind it handles.
    pub async fn attach(self: Arc<Self>, events: &EventDispatcher) {
        events.register(&SUBSCRIPTIONS, self).await;
    }

    /// Dispatch the target's full pending set as one message.
    async fn dispatch_current_state(
        &self,
        tenant: &str,
        controller_id: &str,
    ) -> UpdraftResult<()> {
        let Some(target) = self
            .store
            .target_by_controller_id(tenant, controller_id)
            .await?
        else {
            debug!(tenant, controller_id, "target gone, nothing to dispatch");
            return Ok(());
        };

        let mut actions = self
            .store
            .active_actions_of_target(tenant, target.id)
            .await?;
        if actions.is_empty() {
            return Ok(());
        }
        actions.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.id.cmp(&b.id)));

        let now = Utc::now();
        let message = if actions.len() == 1 {
            self.single_action_message(tenant, controller_id, &actions[0], now)
                .await?
        } else {
            self.multi_action_message(tenant, controller_id, &actions, now)
                .await?
        };

        info!(
            tenant,
            controller_id,
            message = %message.describe(),
            actions = actions.len(),
            "📤 dispatching pending set"
        );
        self.broker.publish(&self.outbound_queue, message).await?;
        Ok(())
    }

    async fn single_action_message(
        &self,
        tenant: &str,
        controller_id: &str,
        action: &Action,
        now: DateTime<Utc>,
    ) -> UpdraftResult<MessageEnvelope> {
        if action.status.is_canceling() {
            return MessageEnvelope::event(
                tenant,
                controller_id,
                MessageTopic::CancelDownload,
                &CancelRequest {
                    action_id: action.id,
                },
            );
        }

        MessageEnvelope::event(
            tenant,
            controller_id,
            self.delivery_topic(action, now)?,
            &DownloadRequest {
                action_id: action.id,
                software_modules: self.module_payloads(tenant, controller_id, action).await?,
            },
        )
    }

    async fn multi_action_message(
        &self,
        tenant: &str,
        controller_id: &str,
        actions: &[Action],
        now: DateTime<Utc>,
    ) -> UpdraftResult<MessageEnvelope> {
        let mut elements = Vec::with_capacity(actions.len());
        for action in actions {
            if action.status.is_canceling() {
                elements.push(MultiActionElement {
                    topic: MessageTopic::CancelDownload,
                    weight: action.weight,
                    action_id: action.id,
                    software_modules: None,
                });
            } else {
                elements.push(MultiActionElement {
                    topic: self.delivery_topic(action, now)?,
                    weight: action.weight,
                    action_id: action.id,
                    software_modules: Some(
                        self.module_payloads(tenant, controller_id, action).await?,
                    ),
                });
            }
        }

        MessageEnvelope::event(
            tenant,
            controller_id,
            MessageTopic::MultiAction,
            &MultiActionRequest { elements },
        )
    }

    /// DOWNLOAD while installation is gated, DOWNLOAD_AND_INSTALL
    /// otherwise.
    fn delivery_topic(&self, action: &Action, now: DateTime<Utc>) -> UpdraftResult<MessageTopic> {
        if action.is_download_only() {
            return Ok(MessageTopic::Download);
        }
        let install_permitted = match &action.maintenance_window {
            Some(window) => window.evaluate(now)?.permits_install(),
            None => true,
        };
        Ok(if install_permitted {
            MessageTopic::DownloadAndInstall
        } else {
            MessageTopic::Download
        })
    }

    async fn module_payloads(
        &self,
        tenant: &str,
        controller_id: &str,
        action: &Action,
    ) -> UpdraftResult<Vec<SoftwareModulePayload>> {
        let set = self
            .store
            .distribution_set(tenant, action.distribution_set_id)
            .await?;
        let base = self.download_base(tenant, controller_id);
        Ok(set
            .modules
            .iter()
            .map(|module| SoftwareModulePayload::from_module(module, &base))
            .collect())
    }

    fn download_base(&self, tenant: &str, controller_id: &str) -> String {
        format!(
            "{}/{}/controller/v1/{}",
            self.artifact_base_url.trim_end_matches('/'),
            tenant,
            controller_id
        )
    }

    async fn send_delete(&self, tenant: &str, controller_id: &str) -> UpdraftResult<()> {
        let message = MessageEnvelope::event(
            tenant,
            controller_id,
            MessageTopic::Delete,
            &serde_json::json!({}),
        )?;
        info!(tenant, controller_id, "📤 notifying device of deletion");
        self.broker.publish(&self.outbound_queue, message).await?;
        Ok(())
    }

    async fn request_attributes(&self, tenant: &str, controller_id: &str) -> UpdraftResult<()> {
        let message = MessageEnvelope::event(
            tenant,
            controller_id,
            MessageTopic::RequestAttributesUpdate,
            &serde_json::json!({}),
        )?;
        debug!(tenant, controller_id, "📤 requesting attribute refresh");
        self.broker.publish(&self.outbound_queue, message).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ProtocolDispatcher {
    fn name(&self) -> &str {
        "protocol_dispatcher"
    }

    async fn handle(&self, event: &DomainEvent) -> UpdraftResult<()> {
        match event {
            DomainEvent::ActionCreated {
                tenant,
                controller_id,
                ..
            }
            | DomainEvent::ActionCanceled {
                tenant,
                controller_id,
                ..
            }
            | DomainEvent::ActionWindowOpened {
                tenant,
                controller_id,
                ..
            }
            | DomainEvent::TargetPoll {
                tenant,
                controller_id,
            } => self.dispatch_current_state(tenant, controller_id).await,
            DomainEvent::TargetDeleted {
                tenant,
                controller_id,
                ..
            } => self.send_delete(tenant, controller_id).await,
            DomainEvent::TargetAttributesRequested {
                tenant,
                controller_id,
                ..
            } => self.request_attributes(tenant, controller_id).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::deployment::{AssignmentRequest, DeploymentManager};
    use crate::dmf::MessageType;
    use crate::maintenance::MaintenanceWindow;
    use crate::messaging::InMemoryBroker;
    use crate::models::{
        Artifact, ArtifactHashes, NewDistributionSet, NewTarget, SoftwareModule,
        MULTI_ASSIGNMENTS_ENABLED,
    };
    use crate::store::InMemoryStore;

    const QUEUE: &str = "updraft.device.outbound";

    struct Fixture {
        store: Arc<InMemoryStore>,
        broker: Arc<InMemoryBroker>,
        deployment: Arc<DeploymentManager>,
        events: Arc<EventDispatcher>,
        ctx: RequestContext,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let events = Arc::new(EventDispatcher::default());
        let deployment = Arc::new(DeploymentManager::new(store.clone(), events.clone()));
        let dispatcher = Arc::new(ProtocolDispatcher::new(
            store.clone(),
            broker.clone(),
            QUEUE,
            "https://updates.example.com",
        ));
        dispatcher.attach(&events).await;

        let ctx = RequestContext::new("default", "admin");
        store
            .create_target(&ctx.tenant, NewTarget::new("device-1"), "system")
            .await
            .unwrap();
        store
            .create_distribution_set(
                &ctx.tenant,
                NewDistributionSet {
                    name: "firmware".to_string(),
                    version: "1.2.0".to_string(),
                    modules: vec![SoftwareModule {
                        id: 10,
                        name: "os".to_string(),
                        version: "1.2.0".to_string(),
                        module_type: "os".to_string(),
                        artifacts: vec![Artifact {
                            id: 100,
                            filename: "image.bin".to_string(),
                            size: 4096,
                            hashes: ArtifactHashes {
                                md5: "aa".to_string(),
                                sha1: "bb".to_string(),
                                sha256: "cc".to_string(),
                            },
                        }],
                    }],
                    complete: true,
                },
                "admin",
            )
            .await
            .unwrap();

        Fixture {
            store,
            broker,
            deployment,
            events,
            ctx,
        }
    }

    #[tokio::test]
    async fn test_assignment_dispatches_download_and_install() {
        let fx = fixture().await;
        let action = fx
            .deployment
            .assign(&fx.ctx, AssignmentRequest::new("device-1", 1))
            .await
            .unwrap();

        let messages = fx.broker.drain(QUEUE);
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.message_type, MessageType::Event);
        assert_eq!(message.topic, Some(MessageTopic::DownloadAndInstall));
        assert_eq!(message.thing_id, "device-1");

        let body: DownloadRequest = message.body_as().unwrap();
        assert_eq!(body.action_id, action.id);
        assert_eq!(
            body.software_modules[0].artifacts[0].download_url,
            "https://updates.example.com/default/controller/v1/device-1/softwaremodules/10/artifacts/image.bin"
        );
    }

    #[tokio::test]
    async fn test_closed_window_downgrades_to_download() {
        let fx = fixture().await;
        let mut request = AssignmentRequest::new("device-1", 1);
        // One hour starting 03:00 on Feb 29; never open at test run time.
        request.maintenance_window =
            Some(MaintenanceWindow::new("0 0 3 29 2 *", "01:00:00", "Z"));
        fx.deployment.assign(&fx.ctx, request).await.unwrap();

        let messages = fx.broker.drain(QUEUE);
        assert_eq!(messages[0].topic, Some(MessageTopic::Download));
    }

    #[tokio::test]
    async fn test_multi_assignment_bundles_ordered_by_weight() {
        let fx = fixture().await;
        fx.store
            .put_tenant_setting(&fx.ctx.tenant, MULTI_ASSIGNMENTS_ENABLED, "true")
            .await
            .unwrap();

        let mut low = AssignmentRequest::new("device-1", 1);
        low.weight = Some(100);
        let low = fx.deployment.assign(&fx.ctx, low).await.unwrap();
        let mut high = AssignmentRequest::new("device-1", 1);
        high.weight = Some(900);
        let high = fx.deployment.assign(&fx.ctx, high).await.unwrap();

        // The second assignment re-dispatched the whole pending set.
        let messages = fx.broker.drain(QUEUE);
        let last = messages.last().unwrap();
        assert_eq!(last.topic, Some(MessageTopic::MultiAction));

        let body: MultiActionRequest = last.body_as().unwrap();
        assert_eq!(body.elements.len(), 2);
        assert_eq!(body.elements[0].action_id, high.id);
        assert_eq!(body.elements[1].action_id, low.id);
        assert!(body.elements.iter().all(|e| e.software_modules.is_some()));

        // Cancelling one entry re-sends the bundle with a cancel element.
        fx.deployment.cancel(&fx.ctx, low.id).await.unwrap();
        let messages = fx.broker.drain(QUEUE);
        let body: MultiActionRequest = messages.last().unwrap().body_as().unwrap();
        let cancel = body
            .elements
            .iter()
            .find(|e| e.action_id == low.id)
            .unwrap();
        assert_eq!(cancel.topic, MessageTopic::CancelDownload);
        assert!(cancel.software_modules.is_none());
    }

    #[tokio::test]
    async fn test_cancel_of_single_action() {
        let fx = fixture().await;
        let action = fx
            .deployment
            .assign(&fx.ctx, AssignmentRequest::new("device-1", 1))
            .await
            .unwrap();
        fx.broker.drain(QUEUE);

        fx.deployment.cancel(&fx.ctx, action.id).await.unwrap();
        let messages = fx.broker.drain(QUEUE);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, Some(MessageTopic::CancelDownload));
        let body: CancelRequest = messages[0].body_as().unwrap();
        assert_eq!(body.action_id, action.id);
    }

    #[tokio::test]
    async fn test_poll_without_pending_work_sends_nothing() {
        let fx = fixture().await;
        fx.events
            .publish(DomainEvent::TargetPoll {
                tenant: fx.ctx.tenant.clone(),
                controller_id: "device-1".to_string(),
            })
            .await;
        assert_eq!(fx.broker.depth(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_delete_and_attribute_request_messages() {
        let fx = fixture().await;
        fx.events
            .publish(DomainEvent::TargetDeleted {
                tenant: fx.ctx.tenant.clone(),
                target_id: 1,
                controller_id: "device-1".to_string(),
            })
            .await;
        fx.events
            .publish(DomainEvent::TargetAttributesRequested {
                tenant: fx.ctx.tenant.clone(),
                target_id: 1,
                controller_id: "device-1".to_string(),
            })
            .await;

        let messages = fx.broker.drain(QUEUE);
        assert_eq!(messages[0].topic, Some(MessageTopic::Delete));
        assert_eq!(
            messages[1].topic,
            Some(MessageTopic::RequestAttributesUpdate)
        );
    }
}
