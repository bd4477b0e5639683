//! # Event Dispatcher
//!
//! ## Overview
//!
//! Routes [`DomainEvent`]s to registered handlers by event kind and
//! mirrors every event onto a broadcast channel for passive observers
//! (UI, tests).
//!
//! ## Key Features
//!
//! - **Typed routing**: handlers subscribe to explicit kinds, never by
//!   string matching
//! - **Isolation**: one failing handler is logged and skipped; remaining
//!   handlers and the broadcast still run
//! - **Fire-and-forget publishing**: publishers never block on slow
//!   observers; the broadcast drops for lagging receivers only

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::UpdraftResult;
use crate::events::domain::{DomainEvent, EventKind};

/// Handler invoked for event kinds it registered for.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> UpdraftResult<()>;
}

/// Kind-keyed handler table plus an observer broadcast.
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    broadcaster: broadcast::Sender<DomainEvent>,
}

impl EventDispatcher {
    /// Create a dispatcher with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(capacity);
        Self {
            handlers: RwLock::new(HashMap::new()),
            broadcaster,
        }
    }

    /// Register a handler for a set of event kinds.
    pub async fn register(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        for kind in kinds {
            handlers.entry(*kind).or_default().push(handler.clone());
        }
        debug!(
            handler = handler.name(),
            kinds = kinds.len(),
            "registered event handler"
        );
    }

    /// Deliver an event to every handler registered for its kind, then
    /// broadcast it. Handler failures are logged and do not stop
    /// delivery to the remaining handlers.
    pub async fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        let registered: Vec<Arc<dyn EventHandler>> = {
            let handlers = self.handlers.read().await;
            handlers.get(&kind).cloned().unwrap_or_default()
        };

        for handler in registered {
            if let Err(error) = handler.handle(&event).await {
                warn!(
                    handler = handler.name(),
                    event = ?kind,
                    tenant = event.tenant(),
                    %error,
                    "event handler failed"
                );
            }
        }

        // No live observer is fine; broadcast is best-effort.
        let _ = self.broadcaster.send(event);
    }

    /// Observe every event regardless of kind.
    pub fn subscribe_all(&self) -> broadcast::Receiver<DomainEvent> {
        self.broadcaster.subscribe()
    }

    /// Number of registered handler entries across all kinds.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.values().map(Vec::len).sum()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdraftError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(&self, _event: &DomainEvent) -> UpdraftResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: &DomainEvent) -> UpdraftResult<()> {
            Err(UpdraftError::internal("boom"))
        }
    }

    fn poll_event() -> DomainEvent {
        DomainEvent::TargetPoll {
            tenant: "default".to_string(),
            controller_id: "device-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_routes_by_kind() {
        let dispatcher = EventDispatcher::default();
        let handler = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        dispatcher
            .register(&[EventKind::TargetPoll], handler.clone())
            .await;

        dispatcher.publish(poll_event()).await;
        dispatcher
            .publish(DomainEvent::RolloutCreated {
                tenant: "default".to_string(),
                rollout_id: 1,
            })
            .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let dispatcher = EventDispatcher::default();
        let counting = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        dispatcher
            .register(&[EventKind::TargetPoll], Arc::new(Failing))
            .await;
        dispatcher
            .register(&[EventKind::TargetPoll], counting.clone())
            .await;

        dispatcher.publish(poll_event()).await;
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribe_all_sees_every_event() {
        let dispatcher = EventDispatcher::default();
        let mut all = dispatcher.subscribe_all();

        dispatcher.publish(poll_event()).await;
        let received = all.recv().await.unwrap();
        assert_eq!(received.kind(), EventKind::TargetPoll);
    }
}
