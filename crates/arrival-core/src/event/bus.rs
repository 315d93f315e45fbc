//! Broadcast event bus for distributing `DispatchEvent` to multiple subscribers.
//!
//! Publishing with no active subscribers is a no-op; the orchestrator never
//! waits on a listener.

use arrival_types::event::DispatchEvent;
use tokio::sync::broadcast;

/// Default channel capacity used by the binary.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Multi-consumer bus for execution lifecycle events.
///
/// Cloning the bus clones the sender, so every clone publishes into the same
/// channel.
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn accepted() -> DispatchEvent {
        DispatchEvent::ExecutionAccepted {
            execution_id: Uuid::now_v7(),
            object_key: "input/a.csv".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(accepted());

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, DispatchEvent::ExecutionAccepted { .. }));
    }

    #[tokio::test]
    async fn every_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(accepted());

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(16);
        bus.publish(accepted());
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn lagged_receiver_does_not_panic() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        for _ in 0..10 {
            bus.publish(accepted());
        }

        match rx.try_recv() {
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clone_shares_channel() {
        let bus = EventBus::new(16);
        let bus2 = bus.clone();
        let mut rx = bus.subscribe();

        bus2.publish(accepted());

        assert!(rx.try_recv().is_ok());
        assert!(format!("{bus:?}").contains("receiver_count"));
    }
}
