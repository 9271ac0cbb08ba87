//! Broadcast events for cross-component notifications.
//!
//! The worker publishes an event after each successful write so attached
//! streams (SSE sessions, tests) can observe ingestion without polling.
//! The bus is constructor-injected; there is no process-global instance.

use crate::vector::DocType;
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    /// A new row was written.
    Created,
    /// An existing row was mutated.
    Updated,
    /// A row was removed.
    Deleted,
}

/// A memory mutation notification.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEvent {
    /// Entity kind the event refers to.
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// What happened.
    pub action: EventAction,
    /// Row id of the entity.
    pub id: i64,
    /// Project the entity belongs to.
    pub project: String,
}

/// Tokio broadcast bus carrying [`MemoryEvent`]s.
///
/// Publishing is best effort: with no subscribers attached the event is
/// dropped, which is the normal idle state.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MemoryEvent>,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    pub fn publish(&self, event: MemoryEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(MemoryEvent {
            doc_type: DocType::Observation,
            action: EventAction::Created,
            id: 7,
            project: "demo".into(),
        });
        let event = rx.recv().await.expect("event");
        assert_eq!(event.id, 7);
        assert_eq!(event.action, EventAction::Created);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(MemoryEvent {
            doc_type: DocType::SessionSummary,
            action: EventAction::Deleted,
            id: 1,
            project: "demo".into(),
        });
    }
}
