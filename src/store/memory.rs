//! # In-Memory Entity Store
//!
//! Reference [`EntityStore`] implementation backing tests and single-node
//! deployments. Tenants are isolated shards behind one `parking_lot`
//! RwLock; every trait method takes the lock exactly once, which gives
//! each operation the same atomicity a SQL implementation gets from a
//! transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{UpdraftError, UpdraftResult};
use crate::filter::TargetFilter;
use crate::models::{
    Action, ActionStatus, DistributionSet, NewAction, NewActionStatus, NewDistributionSet,
    NewTarget, Rollout, RolloutGroup, Target, TenantConfiguration,
};
use crate::state_machine::ActionState;
use crate::store::{EntityStore, GroupActionCounts};

#[derive(Default)]
struct TenantShard {
    targets: HashMap<i64, Target>,
    /// controller id -> target id, unique per tenant
    controller_index: HashMap<String, i64>,
    distribution_sets: HashMap<i64, DistributionSet>,
    actions: HashMap<i64, Action>,
    /// action id -> status rows in append order
    action_statuses: HashMap<i64, Vec<ActionStatus>>,
    rollouts: HashMap<i64, Rollout>,
    groups: HashMap<i64, RolloutGroup>,
    group_members: HashMap<i64, Vec<i64>>,
    settings: HashMap<String, String>,
    sequences: Sequences,
}

#[derive(Default)]
struct Sequences {
    target: i64,
    distribution_set: i64,
    action: i64,
    action_status: i64,
    rollout: i64,
    rollout_group: i64,
}

fn next_id(sequence: &mut i64) -> i64 {
    *sequence += 1;
    *sequence
}

/// Tenant-sharded in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    shards: RwLock<HashMap<String, TenantShard>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a mutation with exclusive access to the tenant's shard.
    fn write<T>(
        &self,
        tenant: &str,
        op: impl FnOnce(&mut TenantShard) -> UpdraftResult<T>,
    ) -> UpdraftResult<T> {
        let mut shards = self.shards.write();
        op(shards.entry(tenant.to_string()).or_default())
    }

    /// Run a query against the tenant's shard; unknown tenants read as
    /// empty.
    fn read<T>(
        &self,
        tenant: &str,
        op: impl FnOnce(Option<&TenantShard>) -> UpdraftResult<T>,
    ) -> UpdraftResult<T> {
        let shards = self.shards.read();
        op(shards.get(tenant))
    }
}

fn require<'a, T>(entity: &'static str, id: i64, found: Option<&'a T>) -> UpdraftResult<&'a T> {
    found.ok_or_else(|| UpdraftError::not_found(entity, id))
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create_target(
        &self,
        tenant: &str,
        new_target: NewTarget,
        created_by: &str,
    ) -> UpdraftResult<Target> {
        self.write(tenant, |shard| {
            if shard.controller_index.contains_key(&new_target.controller_id) {
                return Err(UpdraftError::already_exists(
                    "Target",
                    &new_target.controller_id,
                ));
            }
            let id = next_id(&mut shard.sequences.target);
            let now = Utc::now();
            let target = Target {
                id,
                tenant: tenant.to_string(),
                name: new_target
                    .name
                    .unwrap_or_else(|| new_target.controller_id.clone()),
                controller_id: new_target.controller_id,
                update_status: Default::default(),
                assigned_distribution_set: None,
                installed_distribution_set: None,
                last_poll_at: None,
                attributes: new_target.attributes.unwrap_or_default(),
                attributes_requested: false,
                deleted: false,
                created_by: created_by.to_string(),
                created_at: now,
                updated_at: now,
            };
            shard
                .controller_index
                .insert(target.controller_id.clone(), id);
            shard.targets.insert(id, target.clone());
            Ok(target)
        })
    }

    async fn target(&self, tenant: &str, id: i64) -> UpdraftResult<Target> {
        self.read(tenant, |shard| {
            require(
                "Target",
                id,
                shard.and_then(|shard| shard.targets.get(&id)),
            )
            .cloned()
        })
    }

    async fn target_by_controller_id(
        &self,
        tenant: &str,
        controller_id: &str,
    ) -> UpdraftResult<Option<Target>> {
        self.read(tenant, |shard| {
            Ok(shard.and_then(|shard| {
                shard
                    .controller_index
                    .get(controller_id)
                    .and_then(|id| shard.targets.get(id))
                    .cloned()
            }))
        })
    }

    async fn update_target(&self, tenant: &str, mut target: Target) -> UpdraftResult<Target> {
        self.write(tenant, |shard| {
            require("Target", target.id, shard.targets.get(&target.id))?;
            target.updated_at = Utc::now();
            shard.targets.insert(target.id, target.clone());
            Ok(target)
        })
    }

    async fn list_targets(&self, tenant: &str) -> UpdraftResult<Vec<Target>> {
        self.read(tenant, |shard| {
            let mut targets: Vec<Target> = shard
                .map(|shard| {
                    shard
                        .targets
                        .values()
                        .filter(|t| !t.deleted)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            targets.sort_by_key(|t| t.id);
            Ok(targets)
        })
    }

    async fn targets_matching(
        &self,
        tenant: &str,
        filter: &TargetFilter,
    ) -> UpdraftResult<Vec<Target>> {
        let mut targets = self.list_targets(tenant).await?;
        targets.retain(|t| filter.matches(t));
        Ok(targets)
    }

    async fn remove_target(&self, tenant: &str, id: i64) -> UpdraftResult<()> {
        self.write(tenant, |shard| {
            let target = require("Target", id, shard.targets.get(&id))?;
            shard.controller_index.remove(&target.controller_id);
            shard.targets.remove(&id);
            Ok(())
        })
    }

    async fn create_distribution_set(
        &self,
        tenant: &str,
        new_set: NewDistributionSet,
        created_by: &str,
    ) -> UpdraftResult<DistributionSet> {
        self.write(tenant, |shard| {
            let id = next_id(&mut shard.sequences.distribution_set);
            let now = Utc::now();
            let set = DistributionSet {
                id,
                tenant: tenant.to_string(),
                name: new_set.name,
                version: new_set.version,
                modules: new_set.modules,
                complete: new_set.complete,
                locked: false,
                created_by: created_by.to_string(),
                created_at: now,
                updated_at: now,
            };
            shard.distribution_sets.insert(id, set.clone());
            Ok(set)
        })
    }

    async fn distribution_set(&self, tenant: &str, id: i64) -> UpdraftResult<DistributionSet> {
        self.read(tenant, |shard| {
            require(
                "DistributionSet",
                id,
                shard.and_then(|shard| shard.distribution_sets.get(&id)),
            )
            .cloned()
        })
    }

    async fn update_distribution_set(
        &self,
        tenant: &str,
        mut set: DistributionSet,
    ) -> UpdraftResult<DistributionSet> {
        self.write(tenant, |shard| {
            require("DistributionSet", set.id, shard.distribution_sets.get(&set.id))?;
            set.updated_at = Utc::now();
            shard.distribution_sets.insert(set.id, set.clone());
            Ok(set)
        })
    }

    async fn create_action(
        &self,
        tenant: &str,
        new_action: NewAction,
        created_by: &str,
    ) -> UpdraftResult<Action> {
        self.write(tenant, |shard| {
            require("Target", new_action.target_id, shard.targets.get(&new_action.target_id))?;
            require(
                "DistributionSet",
                new_action.distribution_set_id,
                shard.distribution_sets.get(&new_action.distribution_set_id),
            )?;
            let id = next_id(&mut shard.sequences.action);
            let now = Utc::now();
            let action = Action {
                id,
                tenant: tenant.to_string(),
                target_id: new_action.target_id,
                distribution_set_id: new_action.distribution_set_id,
                action_type: new_action.action_type,
                status: ActionState::Scheduled,
                forced_time: new_action.forced_time,
                maintenance_window: new_action.maintenance_window,
                weight: new_action.weight,
                rollout_id: new_action.rollout_id,
                rollout_group_id: new_action.rollout_group_id,
                created_by: created_by.to_string(),
                created_at: now,
                updated_at: now,
            };
            shard.actions.insert(id, action.clone());
            Ok(action)
        })
    }

    async fn action(&self, tenant: &str, id: i64) -> UpdraftResult<Action> {
        self.read(tenant, |shard| {
            require(
                "Action",
                id,
                shard.and_then(|shard| shard.actions.get(&id)),
            )
            .cloned()
        })
    }

    async fn update_action(&self, tenant: &str, mut action: Action) -> UpdraftResult<Action> {
        self.write(tenant, |shard| {
            require("Action", action.id, shard.actions.get(&action.id))?;
            action.updated_at = Utc::now();
            shard.actions.insert(action.id, action.clone());
            Ok(action)
        })
    }

    async fn actions_of_target(&self, tenant: &str, target_id: i64) -> UpdraftResult<Vec<Action>> {
        self.read(tenant, |shard| {
            let mut actions: Vec<Action> = shard
                .map(|shard| {
                    shard
                        .actions
                        .values()
                        .filter(|a| a.target_id == target_id)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            actions.sort_by_key(|a| std::cmp::Reverse(a.id));
            Ok(actions)
        })
    }

    async fn active_actions_of_target(
        &self,
        tenant: &str,
        target_id: i64,
    ) -> UpdraftResult<Vec<Action>> {
        self.read(tenant, |shard| {
            let mut actions: Vec<Action> = shard
                .map(|shard| {
                    shard
                        .actions
                        .values()
                        .filter(|a| a.target_id == target_id && a.is_active())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            actions.sort_by_key(|a| a.id);
            Ok(actions)
        })
    }

    async fn active_actions_of_rollout(
        &self,
        tenant: &str,
        rollout_id: i64,
    ) -> UpdraftResult<Vec<Action>> {
        self.read(tenant, |shard| {
            let mut actions: Vec<Action> = shard
                .map(|shard| {
                    shard
                        .actions
                        .values()
                        .filter(|a| a.rollout_id == Some(rollout_id) && a.is_active())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            actions.sort_by_key(|a| a.id);
            Ok(actions)
        })
    }

    async fn active_actions_with_windows(&self, tenant: &str) -> UpdraftResult<Vec<Action>> {
        self.read(tenant, |shard| {
            let mut actions: Vec<Action> = shard
                .map(|shard| {
                    shard
                        .actions
                        .values()
                        .filter(|a| a.is_active() && a.has_maintenance_window())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            actions.sort_by_key(|a| a.id);
            Ok(actions)
        })
    }

    async fn append_action_status(
        &self,
        tenant: &str,
        new_status: NewActionStatus,
    ) -> UpdraftResult<ActionStatus> {
        self.write(tenant, |shard| {
            require("Action", new_status.action_id, shard.actions.get(&new_status.action_id))?;
            let id = next_id(&mut shard.sequences.action_status);
            let status = ActionStatus {
                id,
                action_id: new_status.action_id,
                status: new_status.status,
                occurred_at: Utc::now(),
                messages: new_status.messages,
                reported_by: new_status.reported_by,
            };
            shard
                .action_statuses
                .entry(status.action_id)
                .or_default()
                .push(status.clone());
            Ok(status)
        })
    }

    async fn action_status_history(
        &self,
        tenant: &str,
        action_id: i64,
    ) -> UpdraftResult<Vec<ActionStatus>> {
        self.read(tenant, |shard| {
            Ok(shard
                .and_then(|shard| shard.action_statuses.get(&action_id).cloned())
                .unwrap_or_default())
        })
    }

    async fn create_rollout(
        &self,
        tenant: &str,
        mut rollout: Rollout,
        groups: Vec<RolloutGroup>,
    ) -> UpdraftResult<(Rollout, Vec<RolloutGroup>)> {
        self.write(tenant, |shard| {
            let rollout_id = next_id(&mut shard.sequences.rollout);
            let now = Utc::now();
            rollout.id = rollout_id;
            rollout.tenant = tenant.to_string();
            rollout.created_at = now;
            rollout.updated_at = now;

            let mut stored_groups = Vec::with_capacity(groups.len());
            for mut group in groups {
                group.id = next_id(&mut shard.sequences.rollout_group);
                group.tenant = tenant.to_string();
                group.rollout_id = rollout_id;
                group.created_at = now;
                group.updated_at = now;
                shard.groups.insert(group.id, group.clone());
                stored_groups.push(group);
            }
            shard.rollouts.insert(rollout_id, rollout.clone());
            Ok((rollout, stored_groups))
        })
    }

    async fn rollout(&self, tenant: &str, id: i64) -> UpdraftResult<Rollout> {
        self.read(tenant, |shard| {
            require(
                "Rollout",
                id,
                shard.and_then(|shard| shard.rollouts.get(&id)),
            )
            .cloned()
        })
    }

    async fn update_rollout(&self, tenant: &str, mut rollout: Rollout) -> UpdraftResult<Rollout> {
        self.write(tenant, |shard| {
            require("Rollout", rollout.id, shard.rollouts.get(&rollout.id))?;
            rollout.updated_at = Utc::now();
            shard.rollouts.insert(rollout.id, rollout.clone());
            Ok(rollout)
        })
    }

    async fn list_rollouts(&self, tenant: &str) -> UpdraftResult<Vec<Rollout>> {
        self.read(tenant, |shard| {
            let mut rollouts: Vec<Rollout> = shard
                .map(|shard| shard.rollouts.values().cloned().collect())
                .unwrap_or_default();
            rollouts.sort_by_key(|r| r.id);
            Ok(rollouts)
        })
    }

    async fn rollouts_needing_handling(&self, tenant: &str) -> UpdraftResult<Vec<Rollout>> {
        let mut rollouts = self.list_rollouts(tenant).await?;
        rollouts.retain(|r| r.needs_handling());
        Ok(rollouts)
    }

    async fn rollout_group(&self, tenant: &str, id: i64) -> UpdraftResult<RolloutGroup> {
        self.read(tenant, |shard| {
            require(
                "RolloutGroup",
                id,
                shard.and_then(|shard| shard.groups.get(&id)),
            )
            .cloned()
        })
    }

    async fn groups_of_rollout(
        &self,
        tenant: &str,
        rollout_id: i64,
    ) -> UpdraftResult<Vec<RolloutGroup>> {
        self.read(tenant, |shard| {
            let mut groups: Vec<RolloutGroup> = shard
                .map(|shard| {
                    shard
                        .groups
                        .values()
                        .filter(|g| g.rollout_id == rollout_id)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            groups.sort_by_key(|g| g.ordinal);
            Ok(groups)
        })
    }

    async fn update_rollout_group(
        &self,
        tenant: &str,
        mut group: RolloutGroup,
    ) -> UpdraftResult<RolloutGroup> {
        self.write(tenant, |shard| {
            require("RolloutGroup", group.id, shard.groups.get(&group.id))?;
            group.updated_at = Utc::now();
            shard.groups.insert(group.id, group.clone());
            Ok(group)
        })
    }

    async fn set_group_members(
        &self,
        tenant: &str,
        group_id: i64,
        target_ids: Vec<i64>,
    ) -> UpdraftResult<()> {
        self.write(tenant, |shard| {
            require("RolloutGroup", group_id, shard.groups.get(&group_id))?;
            shard.group_members.insert(group_id, target_ids);
            Ok(())
        })
    }

    async fn group_members(&self, tenant: &str, group_id: i64) -> UpdraftResult<Vec<i64>> {
        self.read(tenant, |shard| {
            Ok(shard
                .and_then(|shard| shard.group_members.get(&group_id).cloned())
                .unwrap_or_default())
        })
    }

    async fn group_action_counts(
        &self,
        tenant: &str,
        group_id: i64,
    ) -> UpdraftResult<GroupActionCounts> {
        self.read(tenant, |shard| {
            let mut counts = GroupActionCounts::default();
            if let Some(shard) = shard {
                for action in shard.actions.values() {
                    if action.rollout_group_id != Some(group_id) {
                        continue;
                    }
                    counts.total += 1;
                    match action.status {
                        ActionState::Finished => counts.finished += 1,
                        ActionState::Error => counts.errored += 1,
                        ActionState::Canceled => counts.canceled += 1,
                        _ => counts.active += 1,
                    }
                }
            }
            Ok(counts)
        })
    }

    async fn tenant_configuration(&self, tenant: &str) -> UpdraftResult<TenantConfiguration> {
        self.read(tenant, |shard| {
            let mut config = TenantConfiguration::new(tenant);
            if let Some(shard) = shard {
                config.values = shard.settings.clone();
            }
            Ok(config)
        })
    }

    async fn put_tenant_setting(
        &self,
        tenant: &str,
        key: &str,
        value: &str,
    ) -> UpdraftResult<()> {
        self.write(tenant, |shard| {
            shard.settings.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn tenants(&self) -> UpdraftResult<Vec<String>> {
        let shards = self.shards.read();
        let mut tenants: Vec<String> = shards.keys().cloned().collect();
        tenants.sort();
        Ok(tenants)
    }
}
