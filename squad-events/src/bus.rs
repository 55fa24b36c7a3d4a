//! Broadcast bus for squad events.

use crate::SquadEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Default number of buffered events before slow subscribers lag.
const DEFAULT_CAPACITY: usize = 1024;

/// Cloneable handle for publishing and subscribing to squad events.
///
/// Publishing never blocks and never fails: with no subscribers the event
/// is dropped, and a subscriber that falls behind misses events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SquadEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SquadEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event_type = event_type, receivers = receivers, "Published event");
            }
            Err(_) => {
                debug!(event_type = event_type, "No subscribers for event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SquadEvent> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream, skipping over lag gaps.
    pub fn stream(&self) -> impl Stream<Item = SquadEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| item.ok())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SandboxEventKind;
    use squad_core::new_entity_id;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(SquadEvent::sandbox("sbx", new_entity_id(), SandboxEventKind::Created));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let agent = new_entity_id();
        bus.publish(SquadEvent::sandbox("sbx", agent, SandboxEventKind::Created));
        bus.publish(SquadEvent::sandbox("sbx", agent, SandboxEventKind::Killed));
        assert_eq!(rx.recv().await.unwrap().event_type(), "sandbox:event");
        match rx.recv().await.unwrap() {
            SquadEvent::SandboxEvent { event, .. } => assert_eq!(event, SandboxEventKind::Killed),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_yields_events() {
        let bus = EventBus::new(16);
        let mut stream = Box::pin(bus.stream());
        bus.publish(SquadEvent::sandbox("sbx", new_entity_id(), SandboxEventKind::Paused));
        let event = stream.next().await.unwrap();
        assert_eq!(event.event_type(), "sandbox:event");
    }
}
