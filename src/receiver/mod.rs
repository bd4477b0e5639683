//! # Protocol Receiver
//!
//! ## Overview
//!
//! Consume loop for inbound device messages: registrations, action
//! status reports, attribute updates and pings. Every claimed delivery
//! is settled exactly once. Handler failures are routed by their error
//! disposition: deterministic rejections go to the dead-letter queue
//! immediately, infrastructure failures are redelivered until the
//! redelivery limit, then dead-lettered as well. A poison message can
//! therefore never wedge the queue.
//!
//! ## Key Features
//!
//! - **Per-device serialization**: messages of one controller id are
//!   handled strictly in sequence, different devices run concurrently
//! - **Bounded handling**: a hung handler hits a timeout and the message
//!   is redelivered instead of stalling the loop
//! - **Idempotent registration**: `THING_CREATED` for a known device
//!   refreshes it instead of failing

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::deployment::DeploymentManager;
use crate::dmf::{
    ActionStatusUpdate, AttributeUpdate, DeviceActionStatus, MessageEnvelope, MessageTopic,
    MessageType, PingResponse, ThingCreatedBody,
};
use crate::error::{ErrorDisposition, UpdraftError, UpdraftResult};
use crate::events::{DomainEvent, EventDispatcher};
use crate::messaging::{Delivery, MessageBroker};
use crate::models::{NewTarget, TargetUpdateStatus};
use crate::state_machine::ActionState;
use crate::store::EntityStore;

/// Tuning knobs for the consume loop.
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub inbound_queue: String,
    pub outbound_queue: String,
    /// Upper bound for handling one message.
    pub handler_timeout: Duration,
    /// Redeliveries after which a retryable failure is dead-lettered.
    pub max_redeliveries: u32,
    /// Sleep between polls of an empty queue.
    pub idle_backoff: Duration,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            inbound_queue: "updraft.device.inbound".to_string(),
            outbound_queue: "updraft.device.outbound".to_string(),
            handler_timeout: Duration::from_secs(30),
            max_redeliveries: 3,
            idle_backoff: Duration::from_millis(100),
        }
    }
}

pub struct ProtocolReceiver {
    store: Arc<dyn EntityStore>,
    broker: Arc<dyn MessageBroker>,
    deployment: Arc<DeploymentManager>,
    events: Arc<EventDispatcher>,
    settings: ReceiverSettings,
    controller_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProtocolReceiver {
    pub fn new(
        store: Arc<dyn EntityStore>,
        broker: Arc<dyn MessageBroker>,
        deployment: Arc<DeploymentManager>,
        events: Arc<EventDispatcher>,
        settings: ReceiverSettings,
    ) -> Self {
        Self {
            store,
            broker,
            deployment,
            events,
            settings,
            controller_locks: DashMap::new(),
        }
    }

    /// Consume until the shutdown signal flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.settings.inbound_queue, "protocol receiver started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                processed = self.poll_once() => {
                    if !processed {
                        tokio::time::sleep(self.settings.idle_backoff).await;
                    }
                }
            }
        }
        info!("protocol receiver stopped");
    }

    /// Claim and settle at most one delivery. Returns whether one was
    /// processed.
    pub async fn poll_once(&self) -> bool {
        let delivery = match self.broker.consume(&self.settings.inbound_queue).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return false,
            Err(error) => {
                warn!(%error, "failed to consume from inbound queue");
                return false;
            }
        };
        self.process(delivery).await;
        true
    }

    async fn process(&self, delivery: Delivery) {
        let envelope = &delivery.envelope;
        let lock = self.controller_lock(&envelope.tenant, &envelope.thing_id);
        let _guard = lock.lock().await;

        let outcome = match tokio::time::timeout(
            self.settings.handler_timeout,
            self.handle(envelope),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(UpdraftError::timeout(
                "message handling",
                self.settings.handler_timeout.as_millis() as u64,
            )),
        };

        match outcome {
            Ok(()) => {
                debug!(message = %envelope.describe(), "✅ message handled");
                if let Err(error) = self
                    .broker
                    .ack(&self.settings.inbound_queue, delivery.id)
                    .await
                {
                    warn!(%error, delivery_id = delivery.id, "failed to ack delivery");
                }
            }
            Err(error) => self.settle_failure(&delivery, error).await,
        }
    }

    async fn settle_failure(&self, delivery: &Delivery, error: UpdraftError) {
        let envelope = &delivery.envelope;
        let disposition = error.disposition();
        let exhausted = delivery.redelivery_count >= self.settings.max_redeliveries;

        let result = match disposition {
            ErrorDisposition::Requeue if !exhausted => {
                warn!(
                    message = %envelope.describe(),
                    %error,
                    redelivery_count = delivery.redelivery_count,
                    "transient failure, requeueing"
                );
                self.broker
                    .requeue(&self.settings.inbound_queue, delivery.id)
                    .await
            }
            ErrorDisposition::Requeue => {
                warn!(
                    message = %envelope.describe(),
                    %error,
                    redelivery_count = delivery.redelivery_count,
                    "☠️ redelivery limit reached, dead-lettering"
                );
                self.broker
                    .dead_letter(
                        &self.settings.inbound_queue,
                        delivery.id,
                        &format!(
                            "redelivery limit {} reached: {error}",
                            self.settings.max_redeliveries
                        ),
                    )
                    .await
            }
            ErrorDisposition::DeadLetter => {
                warn!(
                    message = %envelope.describe(),
                    %error,
                    "☠️ permanent failure, dead-lettering"
                );
                self.broker
                    .dead_letter(&self.settings.inbound_queue, delivery.id, &error.to_string())
                    .await
            }
        };

        if let Err(settle_error) = result {
            warn!(%settle_error, delivery_id = delivery.id, "failed to settle delivery");
        }
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> UpdraftResult<()> {
        if envelope.tenant.trim().is_empty() {
            return Err(UpdraftError::malformed("message without tenant"));
        }
        if envelope.thing_id.trim().is_empty() {
            return Err(UpdraftError::malformed("message without thing id"));
        }

        match envelope.message_type {
            MessageType::ThingCreated => self.handle_thing_created(envelope).await,
            MessageType::ThingDeleted => self.handle_thing_deleted(envelope).await,
            MessageType::Ping => self.handle_ping(envelope).await,
            MessageType::Event => match envelope.topic {
                Some(MessageTopic::UpdateActionStatus) => {
                    self.handle_status_update(envelope).await
                }
                Some(MessageTopic::UpdateAttributes) => {
                    self.handle_attribute_update(envelope).await
                }
                Some(topic) => Err(UpdraftError::malformed(format!(
                    "unexpected inbound topic {topic}"
                ))),
                None => Err(UpdraftError::malformed("EVENT message without topic")),
            },
            MessageType::PingResponse => Err(UpdraftError::malformed(
                "PING_RESPONSE is not an inbound message",
            )),
        }
    }

    /// Register a device, or refresh it if it already exists. Either way
    /// the pending set is re-announced.
    async fn handle_thing_created(&self, envelope: &MessageEnvelope) -> UpdraftResult<()> {
        let body: ThingCreatedBody = envelope.body_as()?;
        let tenant = &envelope.tenant;
        let controller_id = &envelope.thing_id;
        let now = Utc::now();

        match self
            .store
            .target_by_controller_id(tenant, controller_id)
            .await?
        {
            Some(target) if target.deleted => {
                return Err(UpdraftError::validation(format!(
                    "target {controller_id} is being deleted"
                )));
            }
            Some(mut target) => {
                if let Some(name) = body.name {
                    target.name = name;
                }
                if let Some(attributes) = &body.attributes {
                    target.apply_attributes(Default::default(), attributes);
                }
                if target.update_status == TargetUpdateStatus::Unknown {
                    target.update_status = TargetUpdateStatus::Registered;
                }
                target.last_poll_at = Some(now);
                self.store.update_target(tenant, target).await?;
                debug!(tenant, controller_id, "known device re-registered");
            }
            None => {
                let new_target = NewTarget {
                    controller_id: controller_id.clone(),
                    name: body.name,
                    attributes: body.attributes,
                };
                let mut target = self.store.create_target(tenant, new_target, "dmf").await?;
                target.update_status = TargetUpdateStatus::Registered;
                target.last_poll_at = Some(now);
                self.store.update_target(tenant, target).await?;
                info!(tenant, controller_id, "device registered");
            }
        }

        self.events
            .publish(DomainEvent::TargetPoll {
                tenant: tenant.clone(),
                controller_id: controller_id.clone(),
            })
            .await;
        Ok(())
    }

    /// Device-initiated removal.
    async fn handle_thing_deleted(&self, envelope: &MessageEnvelope) -> UpdraftResult<()> {
        let ctx = RequestContext::new(&envelope.tenant, envelope.thing_id.as_str());
        self.deployment
            .delete_target(&ctx, &envelope.thing_id)
            .await
    }

    async fn handle_ping(&self, envelope: &MessageEnvelope) -> UpdraftResult<()> {
        self.touch_last_poll(&envelope.tenant, &envelope.thing_id)
            .await?;

        let response = MessageEnvelope::of_type(
            MessageType::PingResponse,
            envelope.tenant.clone(),
            envelope.thing_id.clone(),
            serde_json::to_value(PingResponse {
                server_time: Utc::now(),
            })?,
        );
        self.broker
            .publish(&self.settings.outbound_queue, response)
            .await?;
        Ok(())
    }

    async fn handle_status_update(&self, envelope: &MessageEnvelope) -> UpdraftResult<()> {
        let body: ActionStatusUpdate = envelope.body_as()?;
        let tenant = &envelope.tenant;
        let controller_id = &envelope.thing_id;

        let target = self
            .store
            .target_by_controller_id(tenant, controller_id)
            .await?
            .ok_or_else(|| UpdraftError::not_found("Target", controller_id))?;

        let action = self.store.action(tenant, body.action_id).await?;
        if action.target_id != target.id {
            return Err(UpdraftError::validation(format!(
                "action {} does not belong to thing {controller_id}",
                body.action_id
            )));
        }

        let status = map_device_status(body.status, action.status)?;
        let ctx = RequestContext::new(tenant.as_str(), controller_id.as_str());
        self.deployment
            .update_status(&ctx, action.id, status, body.messages)
            .await?;

        self.touch_last_poll(tenant, controller_id).await?;
        Ok(())
    }

    async fn handle_attribute_update(&self, envelope: &MessageEnvelope) -> UpdraftResult<()> {
        let body: AttributeUpdate = envelope.body_as()?;
        let tenant = &envelope.tenant;
        let controller_id = &envelope.thing_id;

        let mut target = self
            .store
            .target_by_controller_id(tenant, controller_id)
            .await?
            .ok_or_else(|| UpdraftError::not_found("Target", controller_id))?;

        target.apply_attributes(body.mode, &body.attributes);
        target.last_poll_at = Some(Utc::now());
        let target = self.store.update_target(tenant, target).await?;

        debug!(
            tenant,
            controller_id,
            attributes = target.attributes.len(),
            "device attributes updated"
        );
        self.events
            .publish(DomainEvent::TargetUpdated {
                tenant: tenant.clone(),
                target_id: target.id,
                controller_id: target.controller_id,
            })
            .await;
        Ok(())
    }

    async fn touch_last_poll(&self, tenant: &str, controller_id: &str) -> UpdraftResult<()> {
        if let Some(mut target) = self
            .store
            .target_by_controller_id(tenant, controller_id)
            .await?
        {
            target.last_poll_at = Some(Utc::now());
            self.store.update_target(tenant, target).await?;
        }
        Ok(())
    }

    fn controller_lock(&self, tenant: &str, controller_id: &str) -> Arc<Mutex<()>> {
        self.controller_locks
            .entry(format!("{tenant}/{controller_id}"))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Map a device-reported status code onto the action state machine.
///
/// `CANCEL_REJECTED` is positional: it only makes sense while the action
/// is in CANCELING, where it falls back to RUNNING.
fn map_device_status(
    reported: DeviceActionStatus,
    current: ActionState,
) -> UpdraftResult<ActionState> {
    let state = match reported {
        DeviceActionStatus::Download => ActionState::Download,
        DeviceActionStatus::Downloaded => ActionState::Downloaded,
        DeviceActionStatus::Retrieved => ActionState::Retrieved,
        DeviceActionStatus::Running => ActionState::Running,
        DeviceActionStatus::Warning => ActionState::Warning,
        DeviceActionStatus::Finished => ActionState::Finished,
        DeviceActionStatus::Error => ActionState::Error,
        DeviceActionStatus::Canceled => ActionState::Canceled,
        DeviceActionStatus::CancelRejected => {
            if current.is_canceling() {
                ActionState::Running
            } else {
                return Err(UpdraftError::validation(
                    "CANCEL_REJECTED for an action that is not being cancelled",
                ));
            }
        }
    };
    Ok(state)
}
