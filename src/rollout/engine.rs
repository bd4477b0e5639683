//! # Rollout Engine
//!
//! ## Overview
//!
//! Tick-driven campaign progression. Each [`RolloutEngine::advance`]
//! call handles every rollout of one tenant that is in a state needing
//! work: CREATING rollouts get their group membership materialized,
//! STARTING rollouts activate their first group, RUNNING rollouts are
//! evaluated against their thresholds, and DELETING rollouts have their
//! actions cancelled. The same tick also re-dispatches actions whose
//! maintenance window opened since the previous tick.
//!
//! ## Key Features
//!
//! - **Strictly sequential groups**: at most one group activates per
//!   rollout per tick, and only once every predecessor reached a
//!   terminal state
//! - **Per-rollout error boundary**: a failing rollout is logged and
//!   counted, the rest of the tenant's rollouts still progress
//! - **Per-target isolation**: one unassignable target is skipped with
//!   a warning, it never fails its group

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::deployment::{AssignmentRequest, DeploymentManager};
use crate::error::UpdraftResult;
use crate::events::{DomainEvent, EventDispatcher};
use crate::filter::TargetFilter;
use crate::maintenance::WindowState;
use crate::models::{ErrorAction, Rollout, RolloutGroup};
use crate::state_machine::{
    group_transition_allowed, rollout_transition_allowed, ActionState, RolloutGroupState,
    RolloutState,
};
use crate::store::EntityStore;

use super::evaluator::{self, GroupVerdict};

/// What one engine tick did for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rollouts_handled: usize,
    pub groups_activated: usize,
    pub actions_created: usize,
    pub windows_opened: usize,
    pub errors: usize,
}

pub struct RolloutEngine {
    store: Arc<dyn EntityStore>,
    deployment: Arc<DeploymentManager>,
    events: Arc<EventDispatcher>,
}

impl RolloutEngine {
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

    /// Run one tick for a tenant.
    ///
    /// `previous_tick` is the instant of the last completed tick and
    /// bounds the maintenance-window opening detection; `None` treats
    /// every currently open window as newly opened.
    pub async fn advance(
        &self,
        tenant: &str,
        previous_tick: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> TickReport {
        let ctx = RequestContext::system(tenant);
        let mut report = TickReport::default();

        let rollouts = match self.store.rollouts_needing_handling(tenant).await {
            Ok(rollouts) => rollouts,
            Err(error) => {
                warn!(tenant, %error, "failed to list rollouts for tick");
                report.errors += 1;
                return report;
            }
        };

        for rollout in rollouts {
            let rollout_id = rollout.id;
            report.rollouts_handled += 1;
            if let Err(error) = self.handle_rollout(&ctx, rollout, &mut report).await {
                warn!(tenant, rollout_id, %error, "rollout handling failed");
                report.errors += 1;
            }
        }

        if let Err(error) = self
            .reopen_windows(&ctx, previous_tick, now, &mut report)
            .await
        {
            warn!(tenant, %error, "maintenance window scan failed");
            report.errors += 1;
        }

        report
    }

    async fn handle_rollout(
        &self,
        ctx: &RequestContext,
        rollout: Rollout,
        report: &mut TickReport,
    ) -> UpdraftResult<()> {
        match rollout.status {
            RolloutState::Creating => self.fill_groups(ctx, rollout).await,
            RolloutState::Starting => self.start_first_group(ctx, rollout, report).await,
            RolloutState::Running => self.progress(ctx, rollout, report).await,
            RolloutState::Deleting => self.cleanup(ctx, rollout).await,
            status => {
                debug!(rollout_id = rollout.id, %status, "nothing to do");
                Ok(())
            }
        }
    }

    /// CREATING: materialize group membership, then move to READY or
    /// WAITING_FOR_APPROVAL.
    async fn fill_groups(&self, ctx: &RequestContext, rollout: Rollout) -> UpdraftResult<()> {
        let filter = TargetFilter::parse(&rollout.target_filter)?;
        let targets = self.store.targets_matching(&ctx.tenant, &filter).await?;
        let groups = self.store.groups_of_rollout(&ctx.tenant, rollout.id).await?;

        let members = evaluator::partition(&targets, &groups)?;
        for (mut group, target_ids) in groups.into_iter().zip(members) {
            group.total_targets = target_ids.len() as i64;
            self.store
                .set_group_members(&ctx.tenant, group.id, target_ids)
                .await?;
            self.store.update_rollout_group(&ctx.tenant, group).await?;
        }

        let mut rollout = rollout;
        rollout.total_targets = targets.len() as i64;
        let next = if rollout.approval_required {
            RolloutState::WaitingForApproval
        } else {
            RolloutState::Ready
        };
        let rollout = self.transition_rollout(ctx, rollout, next).await?;

        info!(
            tenant = %ctx.tenant,
            rollout_id = rollout.id,
            total_targets = rollout.total_targets,
            status = %rollout.status,
            "rollout groups materialized"
        );
        Ok(())
    }

    /// STARTING: activate the first group and move to RUNNING.
    async fn start_first_group(
        &self,
        ctx: &RequestContext,
        rollout: Rollout,
        report: &mut TickReport,
    ) -> UpdraftResult<()> {
        let groups = self.store.groups_of_rollout(&ctx.tenant, rollout.id).await?;
        if let Some(first) = groups.into_iter().find(|g| g.status.is_activatable()) {
            let (_, created) = self.activate_group(ctx, &rollout, first).await?;
            report.groups_activated += 1;
            report.actions_created += created;
        }
        self.transition_rollout(ctx, rollout, RolloutState::Running)
            .await?;
        Ok(())
    }

    /// RUNNING: judge running groups, activate the next one behind a
    /// terminal predecessor, finish the rollout when all groups closed.
    async fn progress(
        &self,
        ctx: &RequestContext,
        rollout: Rollout,
        report: &mut TickReport,
    ) -> UpdraftResult<()> {
        let mut groups = self.store.groups_of_rollout(&ctx.tenant, rollout.id).await?;

        for group in groups.iter_mut() {
            if group.status != RolloutGroupState::Running {
                continue;
            }
            let counts = self.store.group_action_counts(&ctx.tenant, group.id).await?;
            match evaluator::evaluate_group(group, &counts) {
                GroupVerdict::Continue => {}
                GroupVerdict::Finished => {
                    *group = self
                        .transition_group(ctx, group.clone(), RolloutGroupState::Finished)
                        .await?;
                    info!(
                        tenant = %ctx.tenant,
                        rollout_id = rollout.id,
                        group = %group.name,
                        finished = counts.finished,
                        total = group.total_targets,
                        "rollout group finished"
                    );
                }
                GroupVerdict::Breached => {
                    *group = self
                        .transition_group(ctx, group.clone(), RolloutGroupState::Error)
                        .await?;
                    warn!(
                        tenant = %ctx.tenant,
                        rollout_id = rollout.id,
                        group = %group.name,
                        errored = counts.errored,
                        total = group.total_targets,
                        "rollout group breached its error threshold"
                    );

                    let error_action = group
                        .error_condition
                        .map(|c| c.action)
                        .unwrap_or(ErrorAction::PauseRollout);
                    if error_action == ErrorAction::PauseRollout {
                        self.transition_rollout(ctx, rollout, RolloutState::Paused)
                            .await?;
                        return Ok(());
                    }
                }
            }
        }

        match groups.iter().position(|g| g.status.is_activatable()) {
            Some(index) if groups[..index].iter().all(|g| g.status.unblocks_successor()) => {
                let next = groups[index].clone();
                let (_, created) = self.activate_group(ctx, &rollout, next).await?;
                report.groups_activated += 1;
                report.actions_created += created;
            }
            Some(_) => {}
            None if groups.iter().all(|g| g.status.is_terminal()) => {
                let rollout = self
                    .transition_rollout(ctx, rollout, RolloutState::Finished)
                    .await?;
                info!(
                    tenant = %ctx.tenant,
                    rollout_id = rollout.id,
                    "rollout finished"
                );
            }
            None => {}
        }

        Ok(())
    }

    /// DELETING: cancel in-flight actions; tombstone once they closed.
    async fn cleanup(&self, ctx: &RequestContext, rollout: Rollout) -> UpdraftResult<()> {
        let active = self
            .store
            .active_actions_of_rollout(&ctx.tenant, rollout.id)
            .await?;

        if active.is_empty() {
            let rollout = self
                .transition_rollout(ctx, rollout, RolloutState::Deleted)
                .await?;
            info!(tenant = %ctx.tenant, rollout_id = rollout.id, "rollout deleted");
            return Ok(());
        }

        for action in active {
            if action.status == ActionState::Canceling {
                continue;
            }
            if let Err(error) = self.deployment.cancel(ctx, action.id).await {
                warn!(
                    tenant = %ctx.tenant,
                    rollout_id = rollout.id,
                    action_id = action.id,
                    %error,
                    "failed to cancel action of deleted rollout"
                );
            }
        }
        Ok(())
    }

    /// Create the actions of one group and mark it RUNNING.
    async fn activate_group(
        &self,
        ctx: &RequestContext,
        rollout: &Rollout,
        group: RolloutGroup,
    ) -> UpdraftResult<(RolloutGroup, usize)> {
        let member_ids = self.store.group_members(&ctx.tenant, group.id).await?;
        let mut created = 0;

        for target_id in member_ids {
            let target = match self.store.target(&ctx.tenant, target_id).await {
                Ok(target) => target,
                Err(error) => {
                    warn!(
                        tenant = %ctx.tenant,
                        group = %group.name,
                        target_id,
                        %error,
                        "group member disappeared, skipping"
                    );
                    continue;
                }
            };

            let request = AssignmentRequest {
                controller_id: target.controller_id.clone(),
                distribution_set_id: rollout.distribution_set_id,
                action_type: rollout.action_type,
                forced_time: rollout.forced_time,
                weight: Some(rollout.weight),
                maintenance_window: rollout.maintenance_window.clone(),
                rollout_id: Some(rollout.id),
                rollout_group_id: Some(group.id),
            };
            match self.deployment.assign(ctx, request).await {
                Ok(_) => created += 1,
                Err(error) => {
                    warn!(
                        tenant = %ctx.tenant,
                        group = %group.name,
                        controller_id = %target.controller_id,
                        %error,
                        "skipping unassignable group member"
                    );
                }
            }
        }

        let group = self
            .transition_group(ctx, group, RolloutGroupState::Running)
            .await?;
        info!(
            tenant = %ctx.tenant,
            rollout_id = rollout.id,
            group = %group.name,
            actions_created = created,
            "rollout group activated"
        );
        Ok((group, created))
    }

    /// Emit a re-dispatch event for every action whose maintenance
    /// window opened between the two tick instants.
    async fn reopen_windows(
        &self,
        ctx: &RequestContext,
        previous_tick: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> UpdraftResult<()> {
        for action in self.store.active_actions_with_windows(&ctx.tenant).await? {
            if action.status.is_canceling() {
                continue;
            }
            let Some(window) = &action.maintenance_window else {
                continue;
            };

            match window.evaluate(now) {
                Ok(WindowState::InWindow) => {}
                Ok(_) => continue,
                Err(error) => {
                    warn!(
                        tenant = %ctx.tenant,
                        action_id = action.id,
                        %error,
                        "stored maintenance window no longer evaluates"
                    );
                    continue;
                }
            }

            let newly_opened = match previous_tick {
                Some(prev) => matches!(window.evaluate(prev), Ok(WindowState::Before)),
                None => true,
            };
            if !newly_opened {
                continue;
            }

            let target = self.store.target(&ctx.tenant, action.target_id).await?;
            debug!(
                tenant = %ctx.tenant,
                action_id = action.id,
                controller_id = %target.controller_id,
                "maintenance window opened"
            );
            self.events
                .publish(DomainEvent::ActionWindowOpened {
                    tenant: ctx.tenant.clone(),
                    action_id: action.id,
                    target_id: target.id,
                    controller_id: target.controller_id,
                })
                .await;
            report.windows_opened += 1;
        }
        Ok(())
    }

    async fn transition_rollout(
        &self,
        ctx: &RequestContext,
        mut rollout: Rollout,
        to: RolloutState,
    ) -> UpdraftResult<Rollout> {
        if !rollout_transition_allowed(rollout.status, to) {
            return Err(crate::error::UpdraftError::InvalidRolloutTransition {
                rollout_id: rollout.id,
                from: rollout.status.to_string(),
                to: to.to_string(),
            });
        }
        rollout.status = to;
        let rollout = self.store.update_rollout(&ctx.tenant, rollout).await?;
        self.events
            .publish(DomainEvent::RolloutUpdated {
                tenant: ctx.tenant.clone(),
                rollout_id: rollout.id,
                status: rollout.status,
            })
            .await;
        Ok(rollout)
    }

    async fn transition_group(
        &self,
        ctx: &RequestContext,
        mut group: RolloutGroup,
        to: RolloutGroupState,
    ) -> UpdraftResult<RolloutGroup> {
        if !group_transition_allowed(group.status, to) {
            return Err(crate::error::UpdraftError::validation(format!(
                "rollout group {}: illegal status transition {} -> {}",
                group.id, group.status, to
            )));
        }
        group.status = to;
        let group = self.store.update_rollout_group(&ctx.tenant, group).await?;
        self.events
            .publish(DomainEvent::RolloutGroupUpdated {
                tenant: ctx.tenant.clone(),
                rollout_id: group.rollout_id,
                group_id: group.id,
                status: group.status,
            })
            .await;
        Ok(group)
    }
}
