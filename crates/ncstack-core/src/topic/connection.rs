// ── Connection-status registration ──
//
// Synthetic notification source for an event source's own availability.
// Every lifecycle hook publishes an event-source status notification
// straight to the topic bus, so the final status on close still reaches
// the topics joined at that moment.

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use ncstack_api::{DeviceNotification, NodeId, QName, SchemaPath, XmlElement};
use strum::Display;
use tracing::debug;

use super::{NotificationSourceType, NotificationTopicRegistration, RegistrationBase};
use crate::bus::{TopicBus, TopicId, TopicNotification};

/// Namespace of event-source status notifications.
pub const EVENT_SOURCE_STATUS_NAMESPACE: &str = "urn:ncstack:params:xml:ns:event-source";

const STATUS_NOTIFICATION: &str = "event-source-status-notification";

/// Path of the status notification every event source can emit.
pub fn event_source_status_path() -> SchemaPath {
    SchemaPath::of(QName::new(EVENT_SOURCE_STATUS_NAMESPACE, STATUS_NOTIFICATION))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EventSourceStatus {
    Active,
    Inactive,
    Deactive,
}

pub struct ConnectionStatusRegistration {
    base: RegistrationBase,
    node_id: NodeId,
    bus: TopicBus,
}

impl ConnectionStatusRegistration {
    pub fn new(source_name: impl Into<String>, node_id: NodeId, bus: TopicBus) -> Self {
        Self {
            base: RegistrationBase::new(
                NotificationSourceType::ConnectionStatusChange,
                source_name,
                EVENT_SOURCE_STATUS_NAMESPACE,
                false,
            ),
            node_id,
            bus,
        }
    }

    fn publish(&self, status: EventSourceStatus) {
        let body = XmlElement::qualified(STATUS_NOTIFICATION, EVENT_SOURCE_STATUS_NAMESPACE).with_child(
            XmlElement::qualified("status", EVENT_SOURCE_STATUS_NAMESPACE).with_text(status.to_string()),
        );
        let notification = DeviceNotification {
            path: event_source_status_path(),
            body,
            event_time: Utc::now(),
        };
        for topic_id in self.base.topics_for(&notification.path) {
            let receivers = self.bus.publish(TopicNotification {
                topic_id,
                node_id: self.node_id.clone(),
                notification: notification.clone(),
            });
            debug!(node_id = %self.node_id, %status, receivers, "event source status published");
        }
    }

    fn transition(&self, active: bool, status: EventSourceStatus) -> BoxFuture<'_, ()> {
        self.base.set_active(active);
        self.publish(status);
        future::ready(()).boxed()
    }
}

impl NotificationTopicRegistration for ConnectionStatusRegistration {
    fn base(&self) -> &RegistrationBase {
        &self.base
    }

    fn activate_notification_source(&self) -> BoxFuture<'_, ()> {
        self.transition(true, EventSourceStatus::Active)
    }

    fn deactivate_notification_source(&self) -> BoxFuture<'_, ()> {
        self.transition(false, EventSourceStatus::Inactive)
    }

    fn reactivate_notification_source(&self) -> BoxFuture<'_, ()> {
        self.transition(true, EventSourceStatus::Active)
    }

    fn register_notification_topic(&self, path: SchemaPath, topic_id: TopicId) -> BoxFuture<'_, bool> {
        let accepted = self.check_notification_path(&path);
        if accepted {
            self.base.add_topic(path, topic_id);
        }
        future::ready(accepted).boxed()
    }

    fn unregister_notification_topic(&self, topic_id: TopicId) -> BoxFuture<'_, ()> {
        self.base.remove_topic(&topic_id);
        future::ready(()).boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.base.set_active(false);
        self.publish(EventSourceStatus::Deactive);
        self.base.clear_topics();
        future::ready(()).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn registration(bus: &TopicBus) -> ConnectionStatusRegistration {
        ConnectionStatusRegistration::new("ConnectionNotificationSource", NodeId::new("r1"), bus.clone())
    }

    fn status_of(notification: &DeviceNotification) -> String {
        notification
            .body
            .child("status", Some(EVENT_SOURCE_STATUS_NAMESPACE))
            .map(|s| s.text_content().to_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn lifecycle_publishes_status_notifications() {
        let bus = TopicBus::new(16);
        let mut rx = bus.subscribe();
        let registration = registration(&bus);
        assert!(
            registration
                .register_notification_topic(event_source_status_path(), TopicId::new("status"))
                .await
        );

        registration.activate_notification_source().await;
        assert!(registration.is_active());
        registration.deactivate_notification_source().await;
        assert!(!registration.is_active());
        registration.reactivate_notification_source().await;
        registration.close().await;

        let mut seen = Vec::new();
        while let Ok(published) = rx.try_recv() {
            assert_eq!(published.topic_id, TopicId::new("status"));
            assert_eq!(published.node_id, NodeId::new("r1"));
            assert_eq!(published.notification.path, event_source_status_path());
            seen.push(status_of(&published.notification));
        }
        assert_eq!(seen, ["active", "inactive", "active", "deactive"]);
    }

    #[tokio::test]
    async fn statuses_without_topics_go_nowhere() {
        let bus = TopicBus::new(16);
        let mut rx = bus.subscribe();
        let registration = registration(&bus);

        registration.activate_notification_source().await;
        registration.close().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn accepts_only_status_paths_and_close_clears_topics() {
        let registration = registration(&TopicBus::new(16));

        let foreign = SchemaPath::of(QName::new("urn:other", "link-down"));
        assert!(!registration.register_notification_topic(foreign, TopicId::new("t1")).await);
        assert!(
            registration
                .register_notification_topic(event_source_status_path(), TopicId::new("t1"))
                .await
        );
        assert_eq!(
            registration.topics_for_notification(&event_source_status_path()),
            vec![TopicId::new("t1")]
        );

        registration.close().await;
        assert!(registration.topics_for_notification(&event_source_status_path()).is_empty());
    }
}
