// ── NETCONF event source ──
//
// Proxy between one device and the topic bus. Notifications delivered by
// the device's listeners are pumped through an internal channel and
// republished once per subscribed topic.

use std::sync::{Arc, Weak};

use futures_util::future;
use ncstack_api::{DeviceNotification, NodeId, SchemaContext, SchemaPath, Stream};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{TopicBus, TopicId, TopicNotification};
use crate::config::TopologyConfig;
use crate::device::MountPoint;
use crate::error::CoreError;
use crate::topic::{
    ConnectionStatusRegistration, NotificationTopicRegistration, StreamRegistration,
    event_source_status_path,
};

/// Source name of the connection-status registration.
const CONNECTION_SOURCE_NAME: &str = "netconf-connection";

/// Outcome of [`NetconfEventSource::join_topic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum JoinTopicStatus {
    /// At least one registration took the topic.
    Up,
    Down,
}

pub struct NetconfEventSource {
    node_id: NodeId,
    schema: SchemaContext,
    bus: TopicBus,
    /// Connection-status registration first, then one per configured stream.
    registrations: Vec<Arc<dyn NotificationTopicRegistration>>,
    /// Serializes topic joins.
    joins: Mutex<()>,
    cancel: CancellationToken,
}

impl NetconfEventSource {
    /// Builds the source for a mounted device and starts its notification
    /// pump. Streams are only set up for configured prefixes whose stream
    /// the device advertises.
    pub async fn new(mount: &MountPoint, config: &TopologyConfig, bus: TopicBus) -> Arc<Self> {
        let node_id = mount.node_id.clone();
        let (sink, notifications) = mpsc::unbounded_channel();

        let streams = match mount.services.notifications.available_streams().await {
            Ok(streams) => streams,
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "cannot read device streams");
                Vec::new()
            }
        };

        let connection = Arc::new(ConnectionStatusRegistration::new(
            CONNECTION_SOURCE_NAME,
            node_id.clone(),
            bus.clone(),
        ));
        let mut registrations: Vec<Arc<dyn NotificationTopicRegistration>> = vec![connection];
        for (urn_prefix, stream_name) in &config.stream_map {
            let Some(stream) = streams.iter().find(|s| &s.name == stream_name) else {
                debug!(node_id = %node_id, stream = %stream_name, "stream not advertised by device");
                continue;
            };
            registrations.push(Arc::new(StreamRegistration::new(
                node_id.clone(),
                Stream::clone(stream),
                urn_prefix.clone(),
                mount.services.clone(),
                sink.clone(),
                config.subscription_timeout,
            )));
        }

        let source = Arc::new(Self {
            node_id,
            schema: mount.schema.clone(),
            bus,
            registrations,
            joins: Mutex::new(()),
            cancel: CancellationToken::new(),
        });
        spawn_pump(&source, notifications);

        if let Some(connection) = source.registrations.first() {
            connection.activate_notification_source().await;
        }
        info!(
            node_id = %source.node_id,
            registrations = source.registrations.len(),
            "event source created"
        );
        source
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn registrations(&self) -> &[Arc<dyn NotificationTopicRegistration>] {
        &self.registrations
    }

    /// The status notification plus every notification in the device schema.
    pub fn available_notifications(&self) -> Vec<SchemaPath> {
        std::iter::once(event_source_status_path())
            .chain(self.schema.notifications.iter().cloned())
            .collect()
    }

    // ── Topics ───────────────────────────────────────────────────────

    /// Subscribes `topic_id` to every available notification whose name
    /// (`(namespace)name`) matches `pattern` in full.
    pub async fn join_topic(&self, topic_id: &TopicId, pattern: &str) -> Result<JoinTopicStatus, CoreError> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| CoreError::invalid_argument(format!("notification pattern {pattern:?}: {e}")))?;
        let matching: Vec<SchemaPath> = self
            .available_notifications()
            .into_iter()
            .filter(|path| path.last().is_some_and(|qname| regex.is_match(&qname.to_string())))
            .collect();
        debug!(node_id = %self.node_id, topic = %topic_id, matches = matching.len(), "joining topic");

        let _guard = self.joins.lock().await;
        let mut registered = 0_usize;
        for path in matching {
            for registration in self.owners_of(&path) {
                info!(
                    node_id = %self.node_id,
                    source = %registration.source_name(),
                    topic = %topic_id,
                    "notification source activating"
                );
                if registration
                    .register_notification_topic(path.clone(), topic_id.clone())
                    .await
                {
                    registered += 1;
                }
            }
        }

        Ok(if registered > 0 {
            JoinTopicStatus::Up
        } else {
            JoinTopicStatus::Down
        })
    }

    pub async fn disjoin_topic(&self, topic_id: &TopicId) {
        future::join_all(
            self.registrations
                .iter()
                .map(|r| r.unregister_notification_topic(topic_id.clone())),
        )
        .await;
    }

    /// Records the event time and republishes `notification` for every
    /// topic subscribed to its path.
    pub fn on_notification(&self, notification: &DeviceNotification) {
        for registration in self.owners_of(&notification.path) {
            registration.set_last_event_time(Some(notification.event_time));
            for topic_id in registration.topics_for_notification(&notification.path) {
                let receivers = self.bus.publish(TopicNotification {
                    topic_id: topic_id.clone(),
                    node_id: self.node_id.clone(),
                    notification: notification.clone(),
                });
                debug!(
                    node_id = %self.node_id,
                    path = %notification.path,
                    topic = %topic_id,
                    receivers,
                    "notification published"
                );
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub async fn re_activate_streams(&self) {
        for registration in &self.registrations {
            info!(node_id = %self.node_id, source = %registration.source_name(), "notification source reactivating");
            registration.reactivate_notification_source().await;
        }
    }

    pub async fn de_activate_streams(&self) {
        for registration in &self.registrations {
            info!(node_id = %self.node_id, source = %registration.source_name(), "notification source deactivating");
            registration.deactivate_notification_source().await;
        }
    }

    pub async fn close(&self) {
        for registration in &self.registrations {
            registration.close().await;
        }
        self.cancel.cancel();
        debug!(node_id = %self.node_id, "event source closed");
    }

    fn owners_of<'a>(
        &'a self,
        path: &'a SchemaPath,
    ) -> impl Iterator<Item = &'a Arc<dyn NotificationTopicRegistration>> + 'a {
        self.registrations
            .iter()
            .filter(move |r| r.check_notification_path(path))
    }
}

/// Forwards notifications from the registrations' sink into the source.
/// Stops once the source is closed or dropped.
fn spawn_pump(source: &Arc<NetconfEventSource>, mut notifications: mpsc::UnboundedReceiver<DeviceNotification>) {
    let weak: Weak<NetconfEventSource> = Arc::downgrade(source);
    let cancel = source.cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                notification = notifications.recv() => {
                    let Some(notification) = notification else { break };
                    let Some(source) = weak.upgrade() else { break };
                    source.on_notification(&notification);
                }
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ncstack_api::{NOTIFICATION_NAMESPACE, QName, XmlElement};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{FakeNotifications, FakeRpc, RpcBehavior, services};
    use crate::topic::EVENT_SOURCE_STATUS_NAMESPACE;

    fn config_change() -> SchemaPath {
        SchemaPath::of(QName::new(NOTIFICATION_NAMESPACE, "netconf-config-change"))
    }

    fn vendor_alarm() -> SchemaPath {
        SchemaPath::of(QName::new("urn:vendor:alarms", "alarm"))
    }

    struct Fixture {
        source: Arc<NetconfEventSource>,
        rpc: Arc<FakeRpc>,
        notifications: Arc<FakeNotifications>,
        bus: TopicBus,
    }

    async fn fixture(behavior: RpcBehavior, streams: Vec<Stream>) -> Fixture {
        let rpc = Arc::new(FakeRpc::new(behavior));
        let notifications = Arc::new(FakeNotifications::with_streams(streams));
        let mount = MountPoint {
            node_id: NodeId::new("r1"),
            schema: SchemaContext::with_notifications(vec![config_change(), vendor_alarm()]),
            services: services(&rpc, &notifications),
        };
        let bus = TopicBus::new(16);
        let source = NetconfEventSource::new(&mount, &TopologyConfig::default(), bus.clone()).await;
        Fixture {
            source,
            rpc,
            notifications,
            bus,
        }
    }

    fn notification(path: SchemaPath) -> DeviceNotification {
        DeviceNotification {
            path,
            body: XmlElement::new("netconf-config-change"),
            event_time: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn streams_are_created_only_for_advertised_names() {
        let fx = fixture(RpcBehavior::Succeed, vec![Stream::new("NETCONF")]).await;
        assert_eq!(fx.source.registrations().len(), 2);

        let fx = fixture(RpcBehavior::Succeed, vec![Stream::new("vendor-stream")]).await;
        assert_eq!(fx.source.registrations().len(), 1);
        assert_eq!(fx.source.registrations()[0].source_name(), CONNECTION_SOURCE_NAME);
        assert!(fx.source.registrations()[0].is_active());
    }

    #[tokio::test]
    async fn join_topic_registers_matching_notifications() {
        let fx = fixture(RpcBehavior::Succeed, vec![Stream::new("NETCONF")]).await;
        let topic = TopicId::new("t1");

        let status = fx.source.join_topic(&topic, ".*config-change").await.unwrap();
        assert_eq!(status, JoinTopicStatus::Up);
        assert_eq!(fx.rpc.call_count(), 1);
        assert_eq!(fx.notifications.listener_count(), 1);
    }

    #[tokio::test]
    async fn join_topic_is_down_without_an_owning_registration() {
        let fx = fixture(RpcBehavior::Succeed, vec![Stream::new("NETCONF")]).await;

        // Matches, but no registration owns the vendor namespace.
        let status = fx.source.join_topic(&TopicId::new("t1"), ".*alarm").await.unwrap();
        assert_eq!(status, JoinTopicStatus::Down);

        let status = fx.source.join_topic(&TopicId::new("t2"), "nothing").await.unwrap();
        assert_eq!(status, JoinTopicStatus::Down);
    }

    #[tokio::test]
    async fn join_topic_is_down_when_subscription_fails() {
        let fx = fixture(RpcBehavior::Fail, vec![Stream::new("NETCONF")]).await;

        let status = fx.source.join_topic(&TopicId::new("t1"), ".*config-change").await.unwrap();
        assert_eq!(status, JoinTopicStatus::Down);
        assert_eq!(fx.notifications.listener_count(), 0);
    }

    #[tokio::test]
    async fn invalid_pattern_is_rejected() {
        let fx = fixture(RpcBehavior::Succeed, Vec::new()).await;
        let err = fx.source.join_topic(&TopicId::new("t1"), "(").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn notifications_are_published_per_topic() {
        let fx = fixture(RpcBehavior::Succeed, vec![Stream::new("NETCONF")]).await;
        let mut rx = fx.bus.subscribe();
        fx.source.join_topic(&TopicId::new("t1"), ".*config-change").await.unwrap();
        fx.source.join_topic(&TopicId::new("t2"), ".*netconf-config-change").await.unwrap();

        let sink = fx.notifications.sink_for(&config_change()).unwrap();
        sink.send(notification(config_change())).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.topic_id, TopicId::new("t1"));
        assert_eq!(second.topic_id, TopicId::new("t2"));
        assert_eq!(first.node_id, NodeId::new("r1"));
        assert_eq!(first.notification.path, config_change());
        assert_eq!(
            fx.source.registrations()[1].last_event_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn status_topic_sees_deactivation_and_close() {
        let fx = fixture(RpcBehavior::Succeed, Vec::new()).await;
        let mut rx = fx.bus.subscribe();
        let topic = TopicId::new("status");

        let status = fx
            .source
            .join_topic(&topic, ".*event-source-status-notification")
            .await
            .unwrap();
        assert_eq!(status, JoinTopicStatus::Up);

        fx.source.de_activate_streams().await;
        fx.source.close().await;

        let mut seen = Vec::new();
        while let Ok(published) = rx.try_recv() {
            assert_eq!(published.topic_id, topic);
            assert_eq!(published.notification.path.namespace(), EVENT_SOURCE_STATUS_NAMESPACE);
            let status = published
                .notification
                .body
                .child("status", Some(EVENT_SOURCE_STATUS_NAMESPACE))
                .unwrap();
            seen.push(status.text_content().to_owned());
        }
        assert_eq!(seen, ["inactive", "deactive"]);
    }

    #[tokio::test]
    async fn disjoin_closes_stream_listeners() {
        let fx = fixture(RpcBehavior::Succeed, vec![Stream::new("NETCONF")]).await;
        let topic = TopicId::new("t1");
        fx.source.join_topic(&topic, ".*config-change").await.unwrap();

        fx.source.disjoin_topic(&topic).await;
        assert!(fx.notifications.listener_closed(0));
        assert!(fx.source.registrations()[1].topics_for_notification(&config_change()).is_empty());
    }

    #[tokio::test]
    async fn reactivation_resubscribes_inactive_streams() {
        let fx = fixture(RpcBehavior::Succeed, vec![Stream::new("NETCONF")]).await;
        fx.source.join_topic(&TopicId::new("t1"), ".*config-change").await.unwrap();

        fx.source.de_activate_streams().await;
        assert!(!fx.source.registrations()[1].is_active());

        fx.source.re_activate_streams().await;
        assert!(fx.source.registrations()[1].is_active());
        assert_eq!(fx.rpc.call_count(), 2);
    }
}
