//! Periodic driver for the rollout engine.
//!
//! Discovers tenants from the store and advances each one on a fixed
//! interval. Tenants are ticked sequentially, so two ticks of the same
//! tenant can never overlap; the previous tick instant per tenant feeds
//! the engine's maintenance-window crossing detection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::rollout::{RolloutEngine, TickReport};
use crate::store::EntityStore;

pub struct RolloutTicker {
    store: Arc<dyn EntityStore>,
    engine: Arc<RolloutEngine>,
    interval: Duration,
    last_ticks: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RolloutTicker {
    pub fn new(store: Arc<dyn EntityStore>, engine: Arc<RolloutEngine>, interval: Duration) -> Self {
        Self {
            store,
            engine,
            interval,
            last_ticks: Mutex::new(HashMap::new()),
        }
    }

    /// Tick until the shutdown signal flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "rollout ticker started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick_all().await;
                }
            }
        }
        info!("rollout ticker stopped");
    }

    /// Advance every known tenant once.
    pub async fn tick_all(&self) -> Vec<(String, TickReport)> {
        let now = Utc::now();
        let tenants = match self.store.tenants().await {
            Ok(tenants) => tenants,
            Err(error) => {
                warn!(%error, "failed to discover tenants for tick");
                return Vec::new();
            }
        };

        let mut reports = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let previous = self.last_ticks.lock().get(&tenant).copied();
            let report = self.engine.advance(&tenant, previous, now).await;
            self.last_ticks.lock().insert(tenant.clone(), now);

            if report != TickReport::default() {
                debug!(
                    tenant = %tenant,
                    rollouts_handled = report.rollouts_handled,
                    groups_activated = report.groups_activated,
                    actions_created = report.actions_created,
                    windows_opened = report.windows_opened,
                    errors = report.errors,
                    "tick complete"
                );
            }
            reports.push((tenant, report));
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::deployment::DeploymentManager;
    use crate::events::EventDispatcher;
    use crate::models::{GroupSpec, NewDistributionSet, NewRollout, NewTarget};
    use crate::rollout::RolloutManagement;
    use crate::state_machine::RolloutState;
    use crate::store::InMemoryStore;

    async fn seed_tenant(store: &Arc<InMemoryStore>, management: &RolloutManagement, tenant: &str) {
        let ctx = RequestContext::new(tenant, "admin");
        store
            .create_target(tenant, NewTarget::new("device-1"), "system")
            .await
            .unwrap();
        store
            .create_distribution_set(
                tenant,
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
        management
            .create(
                &ctx,
                NewRollout::new("campaign", "name==device-1", 1, vec![GroupSpec::default()]),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tick_advances_every_tenant() {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(EventDispatcher::default());
        let deployment = Arc::new(DeploymentManager::new(store.clone(), events.clone()));
        let management =
            RolloutManagement::new(store.clone(), deployment.clone(), events.clone());
        let engine = Arc::new(RolloutEngine::new(store.clone(), deployment, events));
        let ticker = RolloutTicker::new(store.clone(), engine, Duration::from_millis(10));

        seed_tenant(&store, &management, "alpha").await;
        seed_tenant(&store, &management, "beta").await;

        let reports = ticker.tick_all().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|(_, r)| r.rollouts_handled == 1));
        assert!(reports.iter().all(|(_, r)| r.errors == 0));

        for tenant in ["alpha", "beta"] {
            let rollout = store.rollout(tenant, 1).await.unwrap();
            assert_eq!(rollout.status, RolloutState::Ready);
        }

        // The previous tick instant is remembered per tenant.
        assert_eq!(ticker.last_ticks.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_run_loop_ticks_until_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(EventDispatcher::default());
        let deployment = Arc::new(DeploymentManager::new(store.clone(), events.clone()));
        let management =
            RolloutManagement::new(store.clone(), deployment.clone(), events.clone());
        let engine = Arc::new(RolloutEngine::new(store.clone(), deployment, events));
        let ticker = Arc::new(RolloutTicker::new(
            store.clone(),
            engine,
            Duration::from_millis(5),
        ));

        seed_tenant(&store, &management, "default").await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(ticker.clone().run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let rollout = store.rollout("default", 1).await.unwrap();
        assert_eq!(rollout.status, RolloutState::Ready);
    }
}
