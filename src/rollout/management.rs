//! # Rollout Management
//!
//! ## Overview
//!
//! Operator-facing rollout operations: creation with full upfront
//! validation, the approval workflow, start/pause/resume, and forced
//! stop or deletion. Campaign progression itself happens on the engine
//! tick; management only moves rollouts between the states the engine
//! reacts to.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::deployment::DeploymentManager;
use crate::error::{UpdraftError, UpdraftResult};
use crate::events::{DomainEvent, EventDispatcher};
use crate::filter::TargetFilter;
use crate::models::{
    NewRollout, Rollout, RolloutGroup, MAX_ACTION_WEIGHT,
};
use crate::state_machine::{rollout_transition_allowed, RolloutGroupState, RolloutState};
use crate::store::{EntityStore, GroupActionCounts, Page, PageRequest};

use super::evaluator;

pub struct RolloutManagement {
    store: Arc<dyn EntityStore>,
    deployment: Arc<DeploymentManager>,
    events: Arc<EventDispatcher>,
}

impl RolloutManagement {
    pub fn new(
        store: Arc<dyn EntityStore>,
        deployment: Arc<DeploymentManager>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            store,
            deployment,
            events,
        }
    }

    /// Create a rollout in CREATING state. Group membership is
    /// materialized asynchronously by the engine; everything that can be
    /// validated eagerly is validated here.
    pub async fn create(&self, ctx: &RequestContext, request: NewRollout) -> UpdraftResult<Rollout> {
        if request.name.trim().is_empty() {
            return Err(UpdraftError::validation("rollout name must not be empty"));
        }
        for existing in self.store.list_rollouts(&ctx.tenant).await? {
            if existing.name == request.name && existing.status != RolloutState::Deleted {
                return Err(UpdraftError::already_exists("Rollout", request.name));
            }
        }

        let filter = TargetFilter::parse(&request.target_filter)?;
        evaluator::validate_groups(&request.groups)?;

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
                "rollout weight {weight} outside 0..={MAX_ACTION_WEIGHT}"
            )));
        }

        let matched = self
            .store
            .targets_matching(&ctx.tenant, &filter)
            .await?
            .len() as i64;

        let now = Utc::now();
        let rollout = Rollout {
            id: 0,
            tenant: ctx.tenant.clone(),
            name: request.name,
            target_filter: request.target_filter,
            distribution_set_id: request.distribution_set_id,
            action_type: request.action_type,
            forced_time: request.forced_time,
            maintenance_window: request.maintenance_window,
            weight,
            status: RolloutState::Creating,
            approval_required: request.approval_required || config.rollout_approval_enabled(),
            approval_decided_by: None,
            approval_remark: None,
            total_targets: matched,
            created_by: ctx.principal.clone(),
            created_at: now,
            updated_at: now,
        };

        let groups: Vec<RolloutGroup> = request
            .groups
            .into_iter()
            .enumerate()
            .map(|(index, spec)| RolloutGroup {
                id: 0,
                tenant: ctx.tenant.clone(),
                rollout_id: 0,
                name: spec
                    .name
                    .unwrap_or_else(|| format!("group-{}", index + 1)),
                ordinal: index as i32,
                target_filter: spec.target_filter,
                target_percentage: spec.target_percentage,
                success_condition: spec.success_condition,
                error_condition: spec.error_condition,
                status: RolloutGroupState::Scheduled,
                total_targets: 0,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let (rollout, _) = self.store.create_rollout(&ctx.tenant, rollout, groups).await?;

        info!(
            tenant = %ctx.tenant,
            rollout_id = rollout.id,
            name = %rollout.name,
            total_targets = rollout.total_targets,
            approval_required = rollout.approval_required,
            "created rollout"
        );

        self.events
            .publish(DomainEvent::RolloutCreated {
                tenant: ctx.tenant.clone(),
                rollout_id: rollout.id,
            })
            .await;

        Ok(rollout)
    }

    /// Approve a rollout waiting for the four-eyes decision.
    pub async fn approve(
        &self,
        ctx: &RequestContext,
        rollout_id: i64,
        remark: Option<String>,
    ) -> UpdraftResult<Rollout> {
        self.decide(ctx, rollout_id, RolloutState::Ready, remark).await
    }

    /// Deny a rollout waiting for the four-eyes decision.
    pub async fn deny(
        &self,
        ctx: &RequestContext,
        rollout_id: i64,
        remark: Option<String>,
    ) -> UpdraftResult<Rollout> {
        self.decide(ctx, rollout_id, RolloutState::ApprovalDenied, remark)
            .await
    }

    /// Request the start of a READY rollout. The first group activates
    /// on the next engine tick.
    pub async fn start(&self, ctx: &RequestContext, rollout_id: i64) -> UpdraftResult<Rollout> {
        let rollout = self.transition(ctx, rollout_id, RolloutState::Starting).await?;
        info!(tenant = %ctx.tenant, rollout_id, "rollout start requested");
        Ok(rollout)
    }

    /// Pause a RUNNING rollout. Actions already handed to devices keep
    /// running; no further group activates.
    pub async fn pause(&self, ctx: &RequestContext, rollout_id: i64) -> UpdraftResult<Rollout> {
        self.transition(ctx, rollout_id, RolloutState::Paused).await
    }

    /// Resume a paused rollout, including one paused by an error
    /// threshold breach.
    pub async fn resume(&self, ctx: &RequestContext, rollout_id: i64) -> UpdraftResult<Rollout> {
        self.transition(ctx, rollout_id, RolloutState::Running).await
    }

    /// Forcefully stop a rollout and cancel its in-flight actions. The
    /// rollout keeps its groups and history but never progresses again.
    pub async fn stop(&self, ctx: &RequestContext, rollout_id: i64) -> UpdraftResult<Rollout> {
        let rollout = self.transition(ctx, rollout_id, RolloutState::Stopped).await?;
        warn!(tenant = %ctx.tenant, rollout_id, "rollout stopped");
        self.cancel_active_actions(ctx, rollout_id).await?;
        Ok(rollout)
    }

    /// Request deletion. Child actions are cancelled by the engine tick;
    /// the rollout becomes a DELETED tombstone once they all closed.
    pub async fn delete(&self, ctx: &RequestContext, rollout_id: i64) -> UpdraftResult<Rollout> {
        let rollout = self.transition(ctx, rollout_id, RolloutState::Deleting).await?;
        info!(tenant = %ctx.tenant, rollout_id, "rollout deletion requested");
        Ok(rollout)
    }

    // Queries

    pub async fn rollout(&self, ctx: &RequestContext, rollout_id: i64) -> UpdraftResult<Rollout> {
        self.store.rollout(&ctx.tenant, rollout_id).await
    }

    /// Non-deleted rollouts, paged, ordered by id.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        page: PageRequest,
    ) -> UpdraftResult<Page<Rollout>> {
        let rollouts: Vec<Rollout> = self
            .store
            .list_rollouts(&ctx.tenant)
            .await?
            .into_iter()
            .filter(|r| r.status != RolloutState::Deleted)
            .collect();
        Ok(Page::slice(rollouts, page))
    }

    /// Groups of a rollout in ordinal order.
    pub async fn groups(
        &self,
        ctx: &RequestContext,
        rollout_id: i64,
    ) -> UpdraftResult<Vec<RolloutGroup>> {
        self.store.rollout(&ctx.tenant, rollout_id).await?;
        self.store.groups_of_rollout(&ctx.tenant, rollout_id).await
    }

    /// Live action counts of one group.
    pub async fn group_counts(
        &self,
        ctx: &RequestContext,
        group_id: i64,
    ) -> UpdraftResult<GroupActionCounts> {
        self.store.rollout_group(&ctx.tenant, group_id).await?;
        self.store.group_action_counts(&ctx.tenant, group_id).await
    }

    // Internals

    async fn decide(
        &self,
        ctx: &RequestContext,
        rollout_id: i64,
        to: RolloutState,
        remark: Option<String>,
    ) -> UpdraftResult<Rollout> {
        let mut rollout = self.store.rollout(&ctx.tenant, rollout_id).await?;
        self.check_transition(&rollout, to)?;
        rollout.status = to;
        rollout.approval_decided_by = Some(ctx.principal.clone());
        rollout.approval_remark = remark;
        let rollout = self.store.update_rollout(&ctx.tenant, rollout).await?;

        info!(
            tenant = %ctx.tenant,
            rollout_id,
            decision = %to,
            decided_by = %ctx.principal,
            "rollout approval decided"
        );
        self.publish_updated(ctx, &rollout).await;
        Ok(rollout)
    }

    async fn transition(
        &self,
        ctx: &RequestContext,
        rollout_id: i64,
        to: RolloutState,
    ) -> UpdraftResult<Rollout> {
        let mut rollout = self.store.rollout(&ctx.tenant, rollout_id).await?;
        self.check_transition(&rollout, to)?;
        rollout.status = to;
        let rollout = self.store.update_rollout(&ctx.tenant, rollout).await?;
        self.publish_updated(ctx, &rollout).await;
        Ok(rollout)
    }

    fn check_transition(&self, rollout: &Rollout, to: RolloutState) -> UpdraftResult<()> {
        if !rollout_transition_allowed(rollout.status, to) {
            return Err(UpdraftError::InvalidRolloutTransition {
                rollout_id: rollout.id,
                from: rollout.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    async fn cancel_active_actions(
        &self,
        ctx: &RequestContext,
        rollout_id: i64,
    ) -> UpdraftResult<()> {
        for action in self
            .store
            .active_actions_of_rollout(&ctx.tenant, rollout_id)
            .await?
        {
            if let Err(error) = self.deployment.cancel(ctx, action.id).await {
                warn!(
                    tenant = %ctx.tenant,
                    rollout_id,
                    action_id = action.id,
                    %error,
                    "failed to cancel rollout action"
                );
            }
        }
        Ok(())
    }

    async fn publish_updated(&self, ctx: &RequestContext, rollout: &Rollout) {
        self.events
            .publish(DomainEvent::RolloutUpdated {
                tenant: ctx.tenant.clone(),
                rollout_id: rollout.id,
                status: rollout.status,
            })
            .await;
    }
}
