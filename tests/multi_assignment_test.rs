//! Integration test for concurrent weighted assignments
//!
//! Covers the multi-action protocol surface:
//! 1. Opt-in gate for a second concurrent assignment
//! 2. Weight-ordered bundling of the full pending set
//! 3. Cancellations riding the same bundle until the device acks
//! 4. Maintenance windows downgrading installs and reopening on tick

mod common;

use chrono::{TimeZone, Utc};
use updraft_core::deployment::AssignmentRequest;
use updraft_core::dmf::{
    DeviceActionStatus, DownloadRequest, MessageTopic, MultiActionRequest,
};
use updraft_core::maintenance::MaintenanceWindow;
use updraft_core::models::MULTI_ASSIGNMENTS_ENABLED;
use updraft_core::state_machine::ActionState;
use updraft_core::EntityStore;

use common::{ctx, harness, status_update, thing_created, Harness, TENANT};

async fn enable_multi_assignment(harness: &Harness) {
    harness
        .store
        .put_tenant_setting(TENANT, MULTI_ASSIGNMENTS_ENABLED, "true")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_second_assignment_requires_opt_in() {
    let harness = harness().await;
    let ctx = ctx();
    let app = harness.seed_distribution_set("app", "1.0.0").await;
    let maps = harness.seed_distribution_set("maps", "2024.3").await;
    harness.deliver(thing_created("truck-1", None)).await;

    harness
        .service
        .deployment()
        .assign(&ctx, AssignmentRequest::new("truck-1", app))
        .await
        .unwrap();
    let denied = harness
        .service
        .deployment()
        .assign(&ctx, AssignmentRequest::new("truck-1", maps))
        .await;
    assert!(denied.is_err());

    let target = harness
        .store
        .target_by_controller_id(TENANT, "truck-1")
        .await
        .unwrap()
        .unwrap();
    let active = harness
        .store
        .active_actions_of_target(TENANT, target.id)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_pending_set_bundles_by_weight() {
    let harness = harness().await;
    let ctx = ctx();
    enable_multi_assignment(&harness).await;
    let app = harness.seed_distribution_set("app", "1.0.0").await;
    let maps = harness.seed_distribution_set("maps", "2024.3").await;
    harness.deliver(thing_created("truck-1", None)).await;

    let mut low = AssignmentRequest::new("truck-1", app);
    low.weight = Some(100);
    harness.service.deployment().assign(&ctx, low).await.unwrap();
    let first = harness.drain_outbound();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].topic, Some(MessageTopic::DownloadAndInstall));

    let mut high = AssignmentRequest::new("truck-1", maps);
    high.weight = Some(900);
    let high_action = harness.service.deployment().assign(&ctx, high).await.unwrap();

    // With two pending actions the whole set goes out as one bundle.
    let second = harness.drain_outbound();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].topic, Some(MessageTopic::MultiAction));
    let bundle: MultiActionRequest = second[0].body_as().unwrap();
    assert_eq!(bundle.elements.len(), 2);
    assert_eq!(bundle.elements[0].action_id, high_action.id);
    assert_eq!(bundle.elements[0].weight, 900);
    assert_eq!(bundle.elements[0].topic, MessageTopic::DownloadAndInstall);
    assert_eq!(bundle.elements[1].weight, 100);
    let maps_modules = bundle.elements[0].software_modules.as_ref().unwrap();
    assert_eq!(maps_modules[0].name, "maps-os");
}

#[tokio::test]
async fn test_cancellation_rides_the_bundle_until_acked() {
    let harness = harness().await;
    let ctx = ctx();
    enable_multi_assignment(&harness).await;
    let app = harness.seed_distribution_set("app", "1.0.0").await;
    let maps = harness.seed_distribution_set("maps", "2024.3").await;
    harness.deliver(thing_created("truck-1", None)).await;

    let mut low = AssignmentRequest::new("truck-1", app);
    low.weight = Some(100);
    let low_action = harness.service.deployment().assign(&ctx, low).await.unwrap();
    let mut high = AssignmentRequest::new("truck-1", maps);
    high.weight = Some(900);
    let high_action = harness.service.deployment().assign(&ctx, high).await.unwrap();
    harness.drain_outbound();

    harness
        .service
        .deployment()
        .cancel(&ctx, high_action.id)
        .await
        .unwrap();

    // The bundle now leads with the cancellation, payload-free.
    let outbound = harness.drain_outbound();
    assert_eq!(outbound.len(), 1);
    let bundle: MultiActionRequest = outbound[0].body_as().unwrap();
    assert_eq!(bundle.elements[0].action_id, high_action.id);
    assert_eq!(bundle.elements[0].topic, MessageTopic::CancelDownload);
    assert!(bundle.elements[0].software_modules.is_none());
    assert_eq!(bundle.elements[1].action_id, low_action.id);
    assert!(bundle.elements[1].software_modules.is_some());

    harness
        .deliver(status_update(
            "truck-1",
            high_action.id,
            DeviceActionStatus::Canceled,
        ))
        .await;
    let closed = harness.store.action(TENANT, high_action.id).await.unwrap();
    assert_eq!(closed.status, ActionState::Canceled);

    // On reconnect the device gets just the surviving assignment.
    harness.deliver(thing_created("truck-1", None)).await;
    let outbound = harness.drain_outbound();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].topic, Some(MessageTopic::DownloadAndInstall));
    let body: DownloadRequest = outbound[0].body_as().unwrap();
    assert_eq!(body.action_id, low_action.id);
}

#[tokio::test]
async fn test_maintenance_window_downgrades_then_reopens() {
    let harness = harness().await;
    let ctx = ctx();
    let set_id = harness.seed_distribution_set("firmware", "3.0.0").await;
    harness.deliver(thing_created("gate-1", None)).await;

    // A leap-day window: practically never open at wall-clock time.
    let mut request = AssignmentRequest::new("gate-1", set_id);
    request.maintenance_window = Some(MaintenanceWindow::new("0 0 3 29 2 *", "01:00:00", "Z"));
    let action = harness.service.deployment().assign(&ctx, request).await.unwrap();

    let initial = harness.drain_outbound();
    assert_eq!(initial.len(), 1);
    assert_eq!(
        initial[0].topic,
        Some(MessageTopic::Download),
        "closed window must downgrade to download-only"
    );

    // Tick across the window boundary: 02:00 -> 03:30 on the leap day.
    let before = Utc.with_ymd_and_hms(2028, 2, 29, 2, 0, 0).unwrap();
    let inside = Utc.with_ymd_and_hms(2028, 2, 29, 3, 30, 0).unwrap();
    let report = harness
        .service
        .engine()
        .advance(TENANT, Some(before), inside)
        .await;
    assert_eq!(report.windows_opened, 1);

    // The opening re-dispatched the pending set.
    let reopened = harness.drain_outbound();
    assert_eq!(reopened.len(), 1);
    let body: DownloadRequest = reopened[0].body_as().unwrap();
    assert_eq!(body.action_id, action.id);

    // A second tick inside the same window stays quiet.
    let later = Utc.with_ymd_and_hms(2028, 2, 29, 3, 45, 0).unwrap();
    let report = harness
        .service
        .engine()
        .advance(TENANT, Some(inside), later)
        .await;
    assert_eq!(report.windows_opened, 0);
    assert!(harness.drain_outbound().is_empty());
}
