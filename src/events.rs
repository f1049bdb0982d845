//! Decoupled event bus for cross-component communication.
//!
//! The bus connection reports its state transitions here and the worker
//! announces every published result and every delivery it skipped. Built on [`tokio::sync::broadcast`] so
//! multiple listeners can react independently.

use tokio::sync::broadcast;

use crate::bus::ConnectionState;

/// Events that flow through the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The bus connection moved to a new state.
    Connection(ConnectionState),
    /// A result message for a report request was published.
    ReportPublished {
        questionnaire_id: String,
        succeeded: bool,
    },
    /// A delivery that was not a report request was acknowledged and dropped.
    DeliverySkipped { tag: u64 },
}

/// A broadcast channel that any component can emit to or subscribe from.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(Event::Connection(ConnectionState::Ready));

        assert_eq!(
            rx.recv().await.unwrap(),
            Event::Connection(ConnectionState::Ready)
        );
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(Event::ReportPublished {
            questionnaire_id: "survey:42".to_string(),
            succeeded: true,
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1, e2);
        assert!(matches!(e1, Event::ReportPublished { succeeded: true, .. }));
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        let count = bus.emit(Event::Connection(ConnectionState::Connecting));
        assert_eq!(count, 0);
    }

    #[test]
    fn emit_with_subscribers_returns_count() {
        let bus = EventBus::default();
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();

        let count = bus.emit(Event::Connection(ConnectionState::Disconnected));
        assert_eq!(count, 2);
    }
}
