//! Event broadcaster for controller events.
//!
//! The `EventBroadcaster` is the bus the controller, its workers and the
//! evented store publish to. It uses tokio's broadcast channel, so any number
//! of observers (log shippers, tests) can subscribe.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::{ControllerEvent, ControllerEventKind};

/// Default buffer size for the broadcast channel.
/// Events beyond this limit will cause older events to be dropped for slow receivers.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Broadcaster for controller events.
///
/// Cheap to clone; all clones share one channel.
///
/// # Example
///
/// ```
/// use reconciler_core::events::{ControllerEventKind, EventBroadcaster};
///
/// let broadcaster = EventBroadcaster::new();
/// let _receiver = broadcaster.subscribe();
///
/// broadcaster.emit(ControllerEventKind::ControllerStarted);
///
/// // let event = _receiver.recv().await.unwrap();
/// ```
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ControllerEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, 0 if there are none.
    pub fn send(&self, event: ControllerEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Timestamp and send an event.
    pub fn emit(&self, kind: ControllerEventKind) -> usize {
        if !self.has_subscribers() {
            return 0;
        }
        self.send(ControllerEvent::new(kind))
    }

    /// Subscribe to events.
    ///
    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceStatus;

    #[test]
    fn test_broadcaster_creation() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(!broadcaster.has_subscribers());
    }

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let count = broadcaster.emit(ControllerEventKind::ControllerStarted);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_broadcaster_send_receive() {
        let broadcaster = EventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();

        broadcaster.emit(ControllerEventKind::WorkerStarted {
            id: "res-1".into(),
            target: ResourceStatus::Creating,
        });

        let event = receiver.recv().await.unwrap();
        match event.kind {
            ControllerEventKind::WorkerStarted { id, target } => {
                assert_eq!(id.as_str(), "res-1");
                assert_eq!(target, ResourceStatus::Creating);
            }
            other => panic!("Expected WorkerStarted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcaster_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let mut receiver1 = broadcaster.subscribe();
        let mut receiver2 = broadcaster.subscribe();

        let count = broadcaster.emit(ControllerEventKind::SweepStarted { resources: 3 });
        assert_eq!(count, 2);

        let event1 = receiver1.recv().await.unwrap();
        let event2 = receiver2.recv().await.unwrap();
        assert_eq!(event1, event2);
    }

    #[test]
    fn test_broadcaster_shared() {
        let broadcaster = EventBroadcaster::new_shared();
        let broadcaster2 = broadcaster.clone();

        let _receiver = broadcaster.subscribe();
        assert_eq!(broadcaster2.subscriber_count(), 1);
    }
}
