//! Store change notifications
//!
//! Stores publish a [`StoreEvent`] after every state change so views can
//! re-read what they display.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::EntityKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Created { id: String },
    Updated { id: String },
    Removed { id: String },
    /// A failed transaction restored the entity
    RolledBack { id: String },
    /// A merge rebuilt the store
    Synced { entities: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreEvent {
    pub kind: EntityKind,
    #[serde(flatten)]
    pub change: Change,
}

/// Broadcast hub shared by the stores of one client.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, kind: EntityKind, change: Change) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(StoreEvent { kind, change });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(EntityKind::Scene, Change::Created { id: "s1".into() });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EntityKind::Scene);
        assert_eq!(event.change, Change::Created { id: "s1".into() });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(0);
        bus.publish(EntityKind::Schedule, Change::Synced { entities: 0 });
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = StoreEvent {
            kind: EntityKind::Schedule,
            change: Change::Removed { id: "s1".into() },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"kind": "schedule", "change": "removed", "id": "s1"})
        );
    }
}
