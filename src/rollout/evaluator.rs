//! Pure decision logic for the rollout engine: group partitioning and
//! threshold verdicts. Keeping this free of storage and I/O makes the
//! progression rules directly testable.

use tracing::debug;

use crate::error::{UpdraftError, UpdraftResult};
use crate::filter::TargetFilter;
use crate::models::{RolloutGroup, Target};
use crate::store::GroupActionCounts;

/// Outcome of evaluating a running group against its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupVerdict {
    /// Neither condition met, keep waiting for devices.
    Continue,
    /// Success condition met, or every action closed without a breach.
    Finished,
    /// Error condition breached.
    Breached,
}

/// Split the rollout's matched targets into per-group member lists.
///
/// Groups claim targets in ordinal order. Each group first narrows the
/// unclaimed remainder through its own sub-filter, then takes its
/// percentage of that pool (round half up). The last group takes the
/// whole pool instead, so no eligible target is left behind by rounding.
/// A target never lands in two groups.
pub fn partition(
    targets: &[Target],
    groups: &[RolloutGroup],
) -> UpdraftResult<Vec<Vec<i64>>> {
    let mut remaining: Vec<&Target> = targets.iter().collect();
    let mut members: Vec<Vec<i64>> = Vec::with_capacity(groups.len());

    for (index, group) in groups.iter().enumerate() {
        let filter = group
            .target_filter
            .as_deref()
            .map(TargetFilter::parse)
            .transpose()?;

        let (eligible, rest): (Vec<&Target>, Vec<&Target>) = remaining
            .into_iter()
            .partition(|t| filter.as_ref().map_or(true, |f| f.matches(t)));

        let take = if index + 1 == groups.len() {
            eligible.len()
        } else {
            claim_size(eligible.len(), group.target_percentage)
        };

        let claimed: Vec<i64> = eligible.iter().take(take).map(|t| t.id).collect();
        debug!(
            group = %group.name,
            ordinal = group.ordinal,
            eligible = eligible.len(),
            claimed = claimed.len(),
            "partitioned rollout group"
        );

        remaining = eligible.into_iter().skip(take).chain(rest).collect();
        members.push(claimed);
    }

    Ok(members)
}

/// Percentage of `pool`, rounded half up, capped at the pool size.
fn claim_size(pool: usize, percentage: u8) -> usize {
    let claimed = (pool * percentage as usize + 50) / 100;
    claimed.min(pool)
}

/// Judge a running group. The error condition is checked first so that a
/// group breaching both thresholds in the same tick pauses the rollout
/// rather than waving the next group through.
pub fn evaluate_group(group: &RolloutGroup, counts: &GroupActionCounts) -> GroupVerdict {
    let total = group.total_targets as u64;

    if let Some(error_condition) = &group.error_condition {
        if error_condition.is_breached(counts.errored, total) {
            return GroupVerdict::Breached;
        }
    }

    if group.success_condition.is_met(counts.finished, total) {
        return GroupVerdict::Finished;
    }

    // Every action closed but the success threshold was never reached
    // (cancellations, errors below the breach level). Nothing more can
    // arrive, so the group must not block its successors forever.
    if counts.total > 0 && counts.all_closed() {
        return GroupVerdict::Finished;
    }

    GroupVerdict::Continue
}

/// Validate a rollout's group percentages and sub-filters at creation.
pub fn validate_groups(groups: &[crate::models::GroupSpec]) -> UpdraftResult<()> {
    if groups.is_empty() {
        return Err(UpdraftError::validation(
            "a rollout needs at least one group",
        ));
    }

    for (index, spec) in groups.iter().enumerate() {
        if !(1..=100).contains(&spec.target_percentage) {
            return Err(UpdraftError::validation(format!(
                "group {} percentage {} outside 1..=100",
                index + 1,
                spec.target_percentage
            )));
        }
        if let Some(filter) = &spec.target_filter {
            TargetFilter::parse(filter)?;
        }
        if spec.success_condition.mode == crate::models::ThresholdMode::Percent
            && spec.success_condition.value > 100
        {
            return Err(UpdraftError::validation(format!(
                "group {} success threshold {}% exceeds 100%",
                index + 1,
                spec.success_condition.value
            )));
        }
        if let Some(error_condition) = &spec.error_condition {
            if error_condition.mode == crate::models::ThresholdMode::Percent
                && error_condition.value > 100
            {
                return Err(UpdraftError::validation(format!(
                    "group {} error threshold {}% exceeds 100%",
                    index + 1,
                    error_condition.value
                )));
            }
        }
    }

    Ok(())
}
