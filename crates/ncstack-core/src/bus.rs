// ── Topic bus ──
//
// Explicitly constructed pub/sub bus onto which event sources republish
// device notifications, tagged with the topic that selected them.

use std::fmt;

use ncstack_api::{DeviceNotification, NodeId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Subscriber-addressable channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random topic id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A device notification republished for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNotification {
    pub topic_id: TopicId,
    /// Event source (device) the notification came from.
    pub node_id: NodeId,
    pub notification: DeviceNotification,
}

/// Broadcast bus of [`TopicNotification`]s. Cheaply cloneable.
#[derive(Debug, Clone)]
pub struct TopicBus {
    tx: broadcast::Sender<TopicNotification>,
}

impl TopicBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes to every current subscriber; returns how many received it.
    pub fn publish(&self, notification: TopicNotification) -> usize {
        // Zero subscribers is not an error: nobody joined the topic yet.
        self.tx.send(notification).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopicNotification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use ncstack_api::{QName, SchemaPath, XmlElement};

    use super::*;

    fn notification(topic: &str) -> TopicNotification {
        TopicNotification {
            topic_id: TopicId::new(topic),
            node_id: NodeId::new("r1"),
            notification: DeviceNotification {
                path: SchemaPath::of(QName::new("urn:test", "link-down")),
                body: XmlElement::qualified("link-down", "urn:test"),
                event_time: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_notifications() {
        let bus = TopicBus::new(8);
        assert_eq!(bus.publish(notification("t0")), 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(notification("t1")), 1);
        assert_eq!(rx.recv().await.unwrap().topic_id, TopicId::new("t1"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TopicId::generate(), TopicId::generate());
    }
}
