//! # Deployment Manager
//!
//! ## Overview
//!
//! Owns the action lifecycle: assignment of distribution sets to
//! targets, cancellation, and ingestion of device-reported status
//! transitions. Every accepted transition is validated against the
//! action transition table, persisted together with exactly one
//! immutable status row, and announced as a domain event.
//!
//! ## Key Features
//!
//! - **Multi-assignment policy**: a second concurrent assignment per
//!   target requires the tenant opt-in, otherwise it is rejected
//! - **Eager validation**: maintenance windows, weights and distribution
//!   set completeness fail at assignment time, never at dispatch time
//! - **Terminal side effects**: FINISHED syncs the target's installed
//!   set and requests an attribute refresh, ERROR flags the target,
//!   CANCELED releases the pending state

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::{UpdraftError, UpdraftResult};
use crate::events::{DomainEvent, EventDispatcher};
use crate::maintenance::MaintenanceWindow;
use crate::models::{
    Action, ActionStatus, ActionType, NewAction, NewActionStatus, SoftwareModule, Target,
    TargetUpdateStatus, MAX_ACTION_WEIGHT,
};
use crate::state_machine::{transitions::action_transition_allowed, ActionState};
use crate::store::EntityStore;

/// Assignment parameters for [`DeploymentManager::assign`].
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub controller_id: String,
    pub distribution_set_id: i64,
    pub action_type: ActionType,
    pub forced_time: Option<DateTime<Utc>>,
    /// Delivery ordering weight; defaults to the tenant's configured
    /// default
    pub weight: Option<i32>,
    pub maintenance_window: Option<MaintenanceWindow>,
    /// Back-references set by the rollout engine for group-created
    /// actions
    pub rollout_id: Option<i64>,
    pub rollout_group_id: Option<i64>,
}

impl AssignmentRequest {
    pub fn new(controller_id: impl Into<String>, distribution_set_id: i64) -> Self {
        Self {
            controller_id: controller_id.into(),
            distribution_set_id,
            action_type: ActionType::default(),
            forced_time: None,
            weight: None,
            maintenance_window: None,
            rollout_id: None,
            rollout_group_id: None,
        }
    }
}

/// Action lifecycle manager.
pub struct DeploymentManager {
    store: Arc<dyn EntityStore>,
    events: Arc<EventDispatcher>,
}

impl DeploymentManager {
    pub fn new(store: Arc<dyn EntityStore>, events: Arc<EventDispatcher>) -> Self {
        Self { store, events }
    }

    /// Assign a distribution set to a target, creating a new action.
    ///
    /// The action is created SCHEDULED and immediately promoted to
    /// RUNNING for delivery; both states appear in the status history.
    pub async fn assign(
        &self,
        ctx: &RequestContext,
        request: AssignmentRequest,
    ) -> UpdraftResult<Action> {
        let target = self.require_target(ctx, &request.controller_id).await?;

        let set = self
            .store
            .distribution_set(&ctx.tenant, request.distribution_set_id)
            .await?;
        if !set.assignable() {
            return Err(UpdraftError::IncompleteDistributionSet { id: set.id });
        }

        if let Some(window) = &request.maintenance_window {
            window.validate()?;
        }

        let config = self.store.tenant_configuration(&ctx.tenant).await?;
        let weight = request.weight.unwrap_or_else(|| config.default_action_weight());
        if !(0..=MAX_ACTION_WEIGHT).contains(&weight) {
            return Err(UpdraftError::validation(format!(
                "action weight {weight} outside 0..={MAX_ACTION_WEIGHT}"
            )));
        }

        let active = self
            .store
            .active_actions_of_target(&ctx.tenant, target.id)
            .await?;
        if !active.is_empty() && !config.multi_assignments_enabled() {
            return Err(UpdraftError::MultiAssignmentNotEnabled {
                controller_id: target.controller_id.clone(),
            });
        }

        let action = self
            .store
            .create_action(
                &ctx.tenant,
                NewAction {
                    target_id: target.id,
                    distribution_set_id: set.id,
                    action_type: request.action_type,
                    forced_time: request.forced_time,
                    maintenance_window: request.maintenance_window,
                    weight,
                    rollout_id: request.rollout_id,
                    rollout_group_id: request.rollout_group_id,
                },
                &ctx.principal,
            )
            .await?;
        self.append_status(ctx, &action, ActionState::Scheduled, Vec::new())
            .await?;

        // Promote for delivery right away; SCHEDULED only exists in the
        // history.
        let action = self
            .apply_transition(ctx, action, ActionState::Running, Vec::new())
            .await?;

        if !set.locked {
            let mut set = set;
            set.locked = true;
            self.store.update_distribution_set(&ctx.tenant, set).await?;
        }

        let mut target = target;
        target.assigned_distribution_set = Some(action.distribution_set_id);
        target.update_status = TargetUpdateStatus::Pending;
        let target = self.store.update_target(&ctx.tenant, target).await?;

        info!(
            tenant = %ctx.tenant,
            controller_id = %target.controller_id,
            action_id = action.id,
            distribution_set_id = action.distribution_set_id,
            action_type = %action.action_type,
            weight = action.weight,
            "assigned distribution set"
        );

        self.events
            .publish(DomainEvent::ActionCreated {
                tenant: ctx.tenant.clone(),
                action_id: action.id,
                target_id: target.id,
                controller_id: target.controller_id.clone(),
            })
            .await;

        Ok(action)
    }

    /// Request cancellation of an active action.
    ///
    /// The action moves to CANCELING and stays there until the device
    /// acknowledges with CANCELED (or an operator force-quits).
    pub async fn cancel(&self, ctx: &RequestContext, action_id: i64) -> UpdraftResult<Action> {
        let action = self.require_action(ctx, action_id).await?;
        if action.status.is_terminal() {
            return Err(UpdraftError::ActionAlreadyClosed { action_id });
        }

        let target = self.store.target(&ctx.tenant, action.target_id).await?;
        let action = self
            .apply_transition(ctx, action, ActionState::Canceling, Vec::new())
            .await?;

        info!(
            tenant = %ctx.tenant,
            action_id,
            controller_id = %target.controller_id,
            "requested action cancellation"
        );

        self.events
            .publish(DomainEvent::ActionCanceled {
                tenant: ctx.tenant.clone(),
                action_id: action.id,
                target_id: target.id,
                controller_id: target.controller_id,
            })
            .await;

        Ok(action)
    }

    /// Operator override closing a CANCELING action as CANCELED without
    /// a device acknowledgment.
    pub async fn force_quit(&self, ctx: &RequestContext, action_id: i64) -> UpdraftResult<Action> {
        let action = self.require_action(ctx, action_id).await?;
        if action.status != ActionState::Canceling {
            return Err(UpdraftError::validation(format!(
                "force quit requires a cancellation in progress, action {action_id} is {}",
                action.status
            )));
        }

        warn!(tenant = %ctx.tenant, action_id, "force quitting action");
        self.close(
            ctx,
            action,
            ActionState::Canceled,
            vec![format!("force quit by {}", ctx.principal)],
        )
        .await
    }

    /// Apply a device-reported (or engine-driven) status transition.
    ///
    /// Illegal transitions are rejected with `InvalidActionTransition`
    /// and leave no trace in the status history.
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        action_id: i64,
        status: ActionState,
        messages: Vec<String>,
    ) -> UpdraftResult<Action> {
        let action = self.require_action(ctx, action_id).await?;
        if action.status.is_terminal() {
            return Err(UpdraftError::ActionAlreadyClosed { action_id });
        }

        if status.is_terminal() {
            return self.close(ctx, action, status, messages).await;
        }

        let mut action = self
            .apply_transition(ctx, action, status, messages)
            .await?;

        // Download-only actions are complete once the payload landed.
        if status == ActionState::Downloaded && action.is_download_only() {
            action = self
                .close(
                    ctx,
                    action,
                    ActionState::Finished,
                    vec!["download-only action closed after download".to_string()],
                )
                .await?;
        } else {
            self.publish_updated(ctx, &action).await?;
        }

        Ok(action)
    }

    /// Tombstone a target and notify the device. The row is removed
    /// immediately when no action is in flight, otherwise after the last
    /// active action closes.
    pub async fn delete_target(
        &self,
        ctx: &RequestContext,
        controller_id: &str,
    ) -> UpdraftResult<()> {
        let mut target = self.require_target(ctx, controller_id).await?;
        let active = self
            .store
            .active_actions_of_target(&ctx.tenant, target.id)
            .await?;

        let target_id = target.id;
        if active.is_empty() {
            self.store.remove_target(&ctx.tenant, target_id).await?;
        } else {
            target.deleted = true;
            self.store.update_target(&ctx.tenant, target).await?;
            debug!(
                tenant = %ctx.tenant,
                controller_id,
                in_flight = active.len(),
                "target tombstoned until in-flight actions close"
            );
        }

        self.events
            .publish(DomainEvent::TargetDeleted {
                tenant: ctx.tenant.clone(),
                target_id,
                controller_id: controller_id.to_string(),
            })
            .await;
        Ok(())
    }

    /// Replace a distribution set's modules. Rejected once the set is
    /// referenced by a non-cancelled action.
    pub async fn replace_modules(
        &self,
        ctx: &RequestContext,
        set_id: i64,
        modules: Vec<SoftwareModule>,
    ) -> UpdraftResult<()> {
        let mut set = self.store.distribution_set(&ctx.tenant, set_id).await?;
        if set.locked {
            return Err(UpdraftError::DistributionSetLocked { id: set_id });
        }
        set.modules = modules;
        self.store.update_distribution_set(&ctx.tenant, set).await?;
        Ok(())
    }

    // Queries

    pub async fn action(&self, ctx: &RequestContext, action_id: i64) -> UpdraftResult<Action> {
        self.require_action(ctx, action_id).await
    }

    /// A target's actions, newest first.
    pub async fn actions_of_target(
        &self,
        ctx: &RequestContext,
        controller_id: &str,
    ) -> UpdraftResult<Vec<Action>> {
        let target = self.require_target(ctx, controller_id).await?;
        self.store.actions_of_target(&ctx.tenant, target.id).await
    }

    /// Status history of an action in append order.
    pub async fn status_history(
        &self,
        ctx: &RequestContext,
        action_id: i64,
    ) -> UpdraftResult<Vec<ActionStatus>> {
        self.require_action(ctx, action_id).await?;
        self.store
            .action_status_history(&ctx.tenant, action_id)
            .await
    }

    // Internals

    async fn require_target(
        &self,
        ctx: &RequestContext,
        controller_id: &str,
    ) -> UpdraftResult<Target> {
        match self
            .store
            .target_by_controller_id(&ctx.tenant, controller_id)
            .await?
        {
            Some(target) if !target.deleted => Ok(target),
            _ => Err(UpdraftError::not_found("Target", controller_id)),
        }
    }

    async fn require_action(&self, ctx: &RequestContext, action_id: i64) -> UpdraftResult<Action> {
        let action = self.store.action(&ctx.tenant, action_id).await?;
        if action.tenant != ctx.tenant {
            return Err(UpdraftError::TenantMismatch {
                message_tenant: ctx.tenant.clone(),
                entity_tenant: action.tenant,
            });
        }
        Ok(action)
    }

    async fn apply_transition(
        &self,
        ctx: &RequestContext,
        mut action: Action,
        to: ActionState,
        messages: Vec<String>,
    ) -> UpdraftResult<Action> {
        if !action_transition_allowed(action.status, to) {
            return Err(UpdraftError::InvalidActionTransition {
                action_id: action.id,
                from: action.status.to_string(),
                to: to.to_string(),
            });
        }
        debug!(
            tenant = %ctx.tenant,
            action_id = action.id,
            from = %action.status,
            to = %to,
            "action transition"
        );
        action.status = to;
        let action = self.store.update_action(&ctx.tenant, action).await?;
        self.append_status(ctx, &action, to, messages).await?;
        Ok(action)
    }

    async fn append_status(
        &self,
        ctx: &RequestContext,
        action: &Action,
        status: ActionState,
        messages: Vec<String>,
    ) -> UpdraftResult<()> {
        self.store
            .append_action_status(
                &ctx.tenant,
                NewActionStatus::new(action.id, status, ctx.principal.as_str())
                    .with_messages(messages),
            )
            .await?;
        Ok(())
    }

    /// Close an action into a terminal state and apply target side
    /// effects.
    async fn close(
        &self,
        ctx: &RequestContext,
        action: Action,
        to: ActionState,
        messages: Vec<String>,
    ) -> UpdraftResult<Action> {
        let download_only = action.is_download_only();
        let action = self.apply_transition(ctx, action, to, messages).await?;
        let mut target = self.store.target(&ctx.tenant, action.target_id).await?;

        let remaining = self
            .store
            .active_actions_of_target(&ctx.tenant, target.id)
            .await?;

        let mut attributes_requested = false;
        match to {
            ActionState::Finished if !download_only => {
                target.installed_distribution_set = Some(action.distribution_set_id);
                target.update_status = if remaining.is_empty() {
                    TargetUpdateStatus::InSync
                } else {
                    TargetUpdateStatus::Pending
                };
                target.attributes_requested = true;
                attributes_requested = true;
            }
            ActionState::Finished | ActionState::Canceled => {
                // Download-only completion and cancellation release the
                // pending state without touching the installed set.
                if remaining.is_empty() && target.update_status == TargetUpdateStatus::Pending {
                    target.update_status = TargetUpdateStatus::Registered;
                }
            }
            ActionState::Error => {
                target.update_status = TargetUpdateStatus::Error;
            }
            _ => {}
        }

        let tombstoned = target.deleted;
        let target = self.store.update_target(&ctx.tenant, target).await?;

        info!(
            tenant = %ctx.tenant,
            action_id = action.id,
            controller_id = %target.controller_id,
            status = %to,
            "action closed"
        );

        self.publish_updated(ctx, &action).await?;
        if attributes_requested {
            self.events
                .publish(DomainEvent::TargetAttributesRequested {
                    tenant: ctx.tenant.clone(),
                    target_id: target.id,
                    controller_id: target.controller_id.clone(),
                })
                .await;
        }

        // Deferred deletion: the tombstone clears once the last
        // in-flight action is gone.
        if tombstoned && remaining.is_empty() {
            self.store.remove_target(&ctx.tenant, target.id).await?;
        }

        Ok(action)
    }

    async fn publish_updated(&self, ctx: &RequestContext, action: &Action) -> UpdraftResult<()> {
        let target = self.store.target(&ctx.tenant, action.target_id).await?;
        self.events
            .publish(DomainEvent::ActionUpdated {
                tenant: ctx.tenant.clone(),
                action_id: action.id,
                target_id: target.id,
                controller_id: target.controller_id,
                status: action.status,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDistributionSet, NewTarget, MULTI_ASSIGNMENTS_ENABLED};
    use crate::store::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        manager: DeploymentManager,
        ctx: RequestContext,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(EventDispatcher::default());
        let manager = DeploymentManager::new(store.clone(), events);
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
                    version: "1.0.0".to_string(),
                    modules: vec![],
                    complete: true,
                },
                "admin",
            )
            .await
            .unwrap();

        Fixture {
            store,
            manager,
            ctx,
        }
    }

    async fn assign(fx: &Fixture) -> Action {
        fx.manager
            .assign(&fx.ctx, AssignmentRequest::new("device-1", 1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_assign_promotes_and_records_history() {
        let fx = fixture().await;
        let action = assign(&fx).await;

        assert_eq!(action.status, ActionState::Running);
        assert_eq!(action.weight, 1000);

        let history = fx
            .manager
            .status_history(&fx.ctx, action.id)
            .await
            .unwrap();
        let states: Vec<ActionState> = history.iter().map(|s| s.status).collect();
        assert_eq!(states, vec![ActionState::Scheduled, ActionState::Running]);

        let target = fx.store.target(&fx.ctx.tenant, 1).await.unwrap();
        assert_eq!(target.update_status, TargetUpdateStatus::Pending);
        assert_eq!(target.assigned_distribution_set, Some(1));

        let set = fx.store.distribution_set(&fx.ctx.tenant, 1).await.unwrap();
        assert!(set.locked);
    }

    #[tokio::test]
    async fn test_second_assignment_requires_tenant_opt_in() {
        let fx = fixture().await;
        assign(&fx).await;

        let denied = fx
            .manager
            .assign(&fx.ctx, AssignmentRequest::new("device-1", 1))
            .await;
        assert!(matches!(
            denied,
            Err(UpdraftError::MultiAssignmentNotEnabled { .. })
        ));

        fx.store
            .put_tenant_setting(&fx.ctx.tenant, MULTI_ASSIGNMENTS_ENABLED, "true")
            .await
            .unwrap();
        let second = fx
            .manager
            .assign(&fx.ctx, AssignmentRequest::new("device-1", 1))
            .await
            .unwrap();
        assert_eq!(second.status, ActionState::Running);
    }

    #[tokio::test]
    async fn test_assign_rejects_incomplete_set_and_bad_window() {
        let fx = fixture().await;
        fx.store
            .create_distribution_set(
                &fx.ctx.tenant,
                NewDistributionSet {
                    name: "wip".to_string(),
                    version: "0.1.0".to_string(),
                    modules: vec![],
                    complete: false,
                },
                "admin",
            )
            .await
            .unwrap();

        let incomplete = fx
            .manager
            .assign(&fx.ctx, AssignmentRequest::new("device-1", 2))
            .await;
        assert!(matches!(
            incomplete,
            Err(UpdraftError::IncompleteDistributionSet { id: 2 })
        ));

        let mut request = AssignmentRequest::new("device-1", 1);
        request.maintenance_window =
            Some(MaintenanceWindow::new("not a cron", "01:00:00", "Z"));
        let bad_window = fx.manager.assign(&fx.ctx, request).await;
        assert!(matches!(
            bad_window,
            Err(UpdraftError::InvalidMaintenanceSchedule { .. })
        ));

        let mut request = AssignmentRequest::new("device-1", 1);
        request.weight = Some(1500);
        let bad_weight = fx.manager.assign(&fx.ctx, request).await;
        assert!(matches!(bad_weight, Err(UpdraftError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_cancel_waits_for_device_acknowledgment() {
        let fx = fixture().await;
        let action = assign(&fx).await;

        let canceling = fx.manager.cancel(&fx.ctx, action.id).await.unwrap();
        assert_eq!(canceling.status, ActionState::Canceling);

        // Still occupies the active slot until the device confirms.
        let active = fx
            .store
            .active_actions_of_target(&fx.ctx.tenant, 1)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let closed = fx
            .manager
            .update_status(&fx.ctx, action.id, ActionState::Canceled, vec![])
            .await
            .unwrap();
        assert_eq!(closed.status, ActionState::Canceled);

        let target = fx.store.target(&fx.ctx.tenant, 1).await.unwrap();
        assert_eq!(target.update_status, TargetUpdateStatus::Registered);

        let again = fx.manager.cancel(&fx.ctx, action.id).await;
        assert!(matches!(
            again,
            Err(UpdraftError::ActionAlreadyClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_rejected_falls_back_to_running() {
        let fx = fixture().await;
        let action = assign(&fx).await;
        fx.manager.cancel(&fx.ctx, action.id).await.unwrap();

        let resumed = fx
            .manager
            .update_status(
                &fx.ctx,
                action.id,
                ActionState::Running,
                vec!["device rejected cancellation".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(resumed.status, ActionState::Running);
    }

    #[tokio::test]
    async fn test_force_quit_requires_canceling() {
        let fx = fixture().await;
        let action = assign(&fx).await;

        let premature = fx.manager.force_quit(&fx.ctx, action.id).await;
        assert!(matches!(premature, Err(UpdraftError::Validation { .. })));

        fx.manager.cancel(&fx.ctx, action.id).await.unwrap();
        let closed = fx.manager.force_quit(&fx.ctx, action.id).await.unwrap();
        assert_eq!(closed.status, ActionState::Canceled);
    }

    #[tokio::test]
    async fn test_finished_syncs_target_and_requests_attributes() {
        let fx = fixture().await;
        let events = fx.manager.events.clone();
        let mut observed = events.subscribe_all();
        let action = assign(&fx).await;

        fx.manager
            .update_status(&fx.ctx, action.id, ActionState::Finished, vec![])
            .await
            .unwrap();

        let target = fx.store.target(&fx.ctx.tenant, 1).await.unwrap();
        assert_eq!(target.update_status, TargetUpdateStatus::InSync);
        assert_eq!(target.installed_distribution_set, Some(1));
        assert!(target.attributes_requested);

        let mut saw_attributes_request = false;
        while let Ok(event) = observed.try_recv() {
            if matches!(event, DomainEvent::TargetAttributesRequested { .. }) {
                saw_attributes_request = true;
            }
        }
        assert!(saw_attributes_request);
    }

    #[tokio::test]
    async fn test_error_flags_target() {
        let fx = fixture().await;
        let action = assign(&fx).await;

        fx.manager
            .update_status(
                &fx.ctx,
                action.id,
                ActionState::Error,
                vec!["flash verification failed".to_string()],
            )
            .await
            .unwrap();

        let target = fx.store.target(&fx.ctx.tenant, 1).await.unwrap();
        assert_eq!(target.update_status, TargetUpdateStatus::Error);
        assert!(target.installed_distribution_set.is_none());
    }

    #[tokio::test]
    async fn test_download_only_closes_on_downloaded() {
        let fx = fixture().await;
        let mut request = AssignmentRequest::new("device-1", 1);
        request.action_type = ActionType::DownloadOnly;
        let action = fx.manager.assign(&fx.ctx, request).await.unwrap();

        fx.manager
            .update_status(&fx.ctx, action.id, ActionState::Download, vec![])
            .await
            .unwrap();
        let closed = fx
            .manager
            .update_status(&fx.ctx, action.id, ActionState::Downloaded, vec![])
            .await
            .unwrap();
        assert_eq!(closed.status, ActionState::Finished);

        // Download-only never touches the installed set.
        let target = fx.store.target(&fx.ctx.tenant, 1).await.unwrap();
        assert!(target.installed_distribution_set.is_none());
        assert_eq!(target.update_status, TargetUpdateStatus::Registered);
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_no_trace() {
        let fx = fixture().await;
        let action = assign(&fx).await;
        let history_before = fx
            .manager
            .status_history(&fx.ctx, action.id)
            .await
            .unwrap()
            .len();

        let rejected = fx
            .manager
            .update_status(&fx.ctx, action.id, ActionState::Scheduled, vec![])
            .await;
        assert!(matches!(
            rejected,
            Err(UpdraftError::InvalidActionTransition { .. })
        ));

        let history_after = fx
            .manager
            .status_history(&fx.ctx, action.id)
            .await
            .unwrap()
            .len();
        assert_eq!(history_before, history_after);
    }

    #[tokio::test]
    async fn test_delete_target_defers_while_actions_in_flight() {
        let fx = fixture().await;
        let action = assign(&fx).await;

        fx.manager.delete_target(&fx.ctx, "device-1").await.unwrap();
        let target = fx.store.target(&fx.ctx.tenant, 1).await.unwrap();
        assert!(target.deleted);

        // Tombstoned targets cannot take new assignments.
        let rejected = fx
            .manager
            .assign(&fx.ctx, AssignmentRequest::new("device-1", 1))
            .await;
        assert!(matches!(rejected, Err(UpdraftError::EntityNotFound { .. })));

        fx.manager
            .update_status(&fx.ctx, action.id, ActionState::Finished, vec![])
            .await
            .unwrap();
        assert!(fx.store.target(&fx.ctx.tenant, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_modules_respects_lock() {
        let fx = fixture().await;
        fx.manager
            .replace_modules(&fx.ctx, 1, vec![])
            .await
            .unwrap();

        assign(&fx).await;
        let locked = fx.manager.replace_modules(&fx.ctx, 1, vec![]).await;
        assert!(matches!(
            locked,
            Err(UpdraftError::DistributionSetLocked { id: 1 })
        ));
    }
}
