//! EventBus - broadcast-based event system for gateway events.
//!
//! Publishes events when inbound messages arrive or outbound statuses
//! change so that downstream consumers (socket pushes, automation) can
//! react without the webhook processor knowing about them.

use crate::message::MessageStatus;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the webhook processor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// An inbound message was persisted
    MessageReceived {
        /// Internal record id
        record_id: Uuid,
        /// Provider message id
        wa_id: String,
        /// Sender phone number
        from: String,
        /// Content extract
        content: String,
    },
    /// A delivery status callback was applied to an outbound message
    MessageStatusChanged {
        /// Provider message id
        wa_id: String,
        /// New status
        status: MessageStatus,
    },
}

/// Broadcast-based event bus.
///
/// Uses `tokio::broadcast` so multiple subscribers receive the same events.
/// Slow subscribers miss events (lagged) rather than blocking the publisher,
/// which keeps webhook handling inside the HTTP response cycle.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to gateway events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Lack of subscribers is not an error.
    pub fn publish(&self, event: GatewayEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();

        bus.publish(GatewayEvent::MessageStatusChanged {
            wa_id: "wamid.X".into(),
            status: MessageStatus::Delivered,
        });

        match receiver.recv().await.unwrap() {
            GatewayEvent::MessageStatusChanged { wa_id, status } => {
                assert_eq!(wa_id, "wamid.X");
                assert_eq!(status, MessageStatus::Delivered);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(GatewayEvent::MessageStatusChanged {
            wa_id: "wamid.Y".into(),
            status: MessageStatus::Read,
        });
    }
}
