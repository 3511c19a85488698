//! Engine event system for presentation layers.
//!
//! The engine publishes its state changes as discrete events on a broadcast
//! channel. Map views, list views, and the WebSocket feed subscribe here
//! instead of polling the store.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use wayfind_types::DiscoveryRecord;

/// Events emitted by the discovery engine.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EngineEvent {
    /// A place was discovered for the first time.
    Discovered { record: DiscoveryRecord },
    /// A fetch produced candidates and their triggers were armed.
    TriggersArmed { place_ids: Vec<String> },
    /// A place query failed; the next qualifying update will retry.
    FetchFailed { error: String },
    /// A fired trigger had no durable registration and was dropped.
    TriggerUnresolved { trigger_id: String },
}

/// Sender for engine events.
pub type EventSender = broadcast::Sender<EngineEvent>;

/// Receiver for engine events.
pub type EventReceiver = broadcast::Receiver<EngineEvent>;

/// Fan-out of engine events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: EngineEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.receiver_count(), 0);
        dispatcher.send(EngineEvent::FetchFailed {
            error: "offline".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        dispatcher.send(EngineEvent::TriggerUnresolved {
            trigger_id: "42".to_string(),
        });

        let expected = EngineEvent::TriggerUnresolved {
            trigger_id: "42".to_string(),
        };
        assert_eq!(a.recv().await.unwrap(), expected);
        assert_eq!(b.recv().await.unwrap(), expected);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = EngineEvent::TriggersArmed {
            place_ids: vec!["101".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "triggers_armed");
        assert_eq!(json["place_ids"][0], "101");
    }
}
