//! # Entity Store
//!
//! Persistence seam for all domain entities. The engine, deployment
//! manager and protocol receiver are written against the [`EntityStore`]
//! trait; a SQL-backed implementation can be swapped in without touching
//! orchestration logic. The bundled [`InMemoryStore`] backs tests and
//! single-node deployments.
//!
//! ## Contract
//!
//! - Every operation is one atomic unit: concurrent callers never observe
//!   a half-applied mutation.
//! - Ids are store-assigned, monotonically increasing per entity type.
//! - Mutating an entity bumps `updated_at`; `created_at` never changes.
//! - All reads and writes are tenant-scoped; no operation crosses tenants.

pub mod memory;

use async_trait::async_trait;

use crate::error::UpdraftResult;
use crate::filter::TargetFilter;
use crate::models::{
    Action, ActionStatus, DistributionSet, NewAction, NewActionStatus, NewDistributionSet,
    NewTarget, Rollout, RolloutGroup, Target, TenantConfiguration,
};

pub use memory::InMemoryStore;

/// Terminal/active breakdown of a rollout group's actions, computed as an
/// atomic snapshot for threshold evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupActionCounts {
    pub total: u64,
    pub finished: u64,
    pub errored: u64,
    pub canceled: u64,
    pub active: u64,
}

impl GroupActionCounts {
    /// Whether every created action has reached a terminal state.
    pub fn all_closed(&self) -> bool {
        self.active == 0
    }
}

/// Offset/limit window for paged queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    /// Cut one page out of a fully materialized result list.
    pub fn slice(mut items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len();
        let end = request.offset.saturating_add(request.limit).min(total);
        let start = request.offset.min(end);
        items.truncate(end);
        items.drain(..start);
        Self { items, total }
    }
}

/// Durable storage for targets, distribution sets, actions, rollouts and
/// tenant configuration.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // Targets

    /// Create a target. Fails with `EntityAlreadyExists` when the
    /// controller id is taken within the tenant.
    async fn create_target(
        &self,
        tenant: &str,
        new_target: NewTarget,
        created_by: &str,
    ) -> UpdraftResult<Target>;

    async fn target(&self, tenant: &str, id: i64) -> UpdraftResult<Target>;

    async fn target_by_controller_id(
        &self,
        tenant: &str,
        controller_id: &str,
    ) -> UpdraftResult<Option<Target>>;

    /// Replace a target row. The id must already exist.
    async fn update_target(&self, tenant: &str, target: Target) -> UpdraftResult<Target>;

    /// All non-tombstoned targets of the tenant.
    async fn list_targets(&self, tenant: &str) -> UpdraftResult<Vec<Target>>;

    /// Non-tombstoned targets matching a parsed filter, ordered by id.
    async fn targets_matching(
        &self,
        tenant: &str,
        filter: &TargetFilter,
    ) -> UpdraftResult<Vec<Target>>;

    /// Physically remove a target row (tombstone cleanup).
    async fn remove_target(&self, tenant: &str, id: i64) -> UpdraftResult<()>;

    // Distribution sets

    async fn create_distribution_set(
        &self,
        tenant: &str,
        new_set: NewDistributionSet,
        created_by: &str,
    ) -> UpdraftResult<DistributionSet>;

    async fn distribution_set(&self, tenant: &str, id: i64) -> UpdraftResult<DistributionSet>;

    async fn update_distribution_set(
        &self,
        tenant: &str,
        set: DistributionSet,
    ) -> UpdraftResult<DistributionSet>;

    // Actions

    /// Create an action in its initial state. The referenced target and
    /// distribution set must exist.
    async fn create_action(
        &self,
        tenant: &str,
        new_action: NewAction,
        created_by: &str,
    ) -> UpdraftResult<Action>;

    async fn action(&self, tenant: &str, id: i64) -> UpdraftResult<Action>;

    async fn update_action(&self, tenant: &str, action: Action) -> UpdraftResult<Action>;

    /// Every action of a target, newest first.
    async fn actions_of_target(&self, tenant: &str, target_id: i64) -> UpdraftResult<Vec<Action>>;

    /// Non-terminal actions of a target, ordered by id.
    async fn active_actions_of_target(
        &self,
        tenant: &str,
        target_id: i64,
    ) -> UpdraftResult<Vec<Action>>;

    /// Non-terminal actions created by a rollout, ordered by id.
    async fn active_actions_of_rollout(
        &self,
        tenant: &str,
        rollout_id: i64,
    ) -> UpdraftResult<Vec<Action>>;

    /// Non-terminal actions carrying a maintenance window, ordered by
    /// id. Scanned on every tick for window openings.
    async fn active_actions_with_windows(&self, tenant: &str) -> UpdraftResult<Vec<Action>>;

    /// Append one immutable status row.
    async fn append_action_status(
        &self,
        tenant: &str,
        new_status: NewActionStatus,
    ) -> UpdraftResult<ActionStatus>;

    /// Status rows of an action in append order.
    async fn action_status_history(
        &self,
        tenant: &str,
        action_id: i64,
    ) -> UpdraftResult<Vec<ActionStatus>>;

    // Rollouts

    /// Persist a rollout and its groups in one unit. Ids and group
    /// back-references are assigned by the store.
    async fn create_rollout(
        &self,
        tenant: &str,
        rollout: Rollout,
        groups: Vec<RolloutGroup>,
    ) -> UpdraftResult<(Rollout, Vec<RolloutGroup>)>;

    async fn rollout(&self, tenant: &str, id: i64) -> UpdraftResult<Rollout>;

    async fn update_rollout(&self, tenant: &str, rollout: Rollout) -> UpdraftResult<Rollout>;

    async fn list_rollouts(&self, tenant: &str) -> UpdraftResult<Vec<Rollout>>;

    /// Rollouts in a state the scheduler tick must handle.
    async fn rollouts_needing_handling(&self, tenant: &str) -> UpdraftResult<Vec<Rollout>>;

    async fn rollout_group(&self, tenant: &str, id: i64) -> UpdraftResult<RolloutGroup>;

    /// Groups of a rollout in ordinal order.
    async fn groups_of_rollout(
        &self,
        tenant: &str,
        rollout_id: i64,
    ) -> UpdraftResult<Vec<RolloutGroup>>;

    async fn update_rollout_group(
        &self,
        tenant: &str,
        group: RolloutGroup,
    ) -> UpdraftResult<RolloutGroup>;

    /// Record the materialized membership of a group.
    async fn set_group_members(
        &self,
        tenant: &str,
        group_id: i64,
        target_ids: Vec<i64>,
    ) -> UpdraftResult<()>;

    async fn group_members(&self, tenant: &str, group_id: i64) -> UpdraftResult<Vec<i64>>;

    /// Atomic snapshot of a group's action counts.
    async fn group_action_counts(
        &self,
        tenant: &str,
        group_id: i64,
    ) -> UpdraftResult<GroupActionCounts>;

    // Tenant configuration

    /// Current configuration snapshot; empty defaults for unknown tenants.
    async fn tenant_configuration(&self, tenant: &str) -> UpdraftResult<TenantConfiguration>;

    async fn put_tenant_setting(&self, tenant: &str, key: &str, value: &str)
        -> UpdraftResult<()>;

    /// Tenants with any stored data, for scheduler discovery.
    async fn tenants(&self) -> UpdraftResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slice() {
        let items: Vec<i32> = (0..10).collect();

        let page = Page::slice(items.clone(), PageRequest { offset: 0, limit: 4 });
        assert_eq!(page.items, vec![0, 1, 2, 3]);
        assert_eq!(page.total, 10);

        let page = Page::slice(items.clone(), PageRequest { offset: 8, limit: 4 });
        assert_eq!(page.items, vec![8, 9]);

        let page = Page::slice(items, PageRequest { offset: 20, limit: 4 });
        assert!(page.items.is_empty());
        assert_eq!(page.total, 10);
    }

    #[test]
    fn test_group_counts_all_closed() {
        let counts = GroupActionCounts {
            total: 5,
            finished: 3,
            errored: 1,
            canceled: 1,
            active: 0,
        };
        assert!(counts.all_closed());

        let counts = GroupActionCounts {
            active: 2,
            ..counts
        };
        assert!(!counts.all_closed());
    }
}
