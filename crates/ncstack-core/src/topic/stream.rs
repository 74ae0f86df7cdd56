// ── Stream registration ──
//
// One NETCONF notification stream advertised by a device. The stream is
// subscribed with `create-subscription` the first time a topic needs it;
// a failed or timed-out subscription leaves it inactive until the next
// registration or reactivation tries again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use ncstack_api::{
    DeviceServices, ListenerRegistration, NodeId, NotificationSink, SchemaPath, Stream,
    create_subscription_input, create_subscription_rpc,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{NotificationSourceType, NotificationTopicRegistration, RegistrationBase};
use crate::bus::TopicId;

pub struct StreamRegistration {
    base: RegistrationBase,
    node_id: NodeId,
    stream: Stream,
    services: DeviceServices,
    /// Where registered listeners deliver notifications.
    sink: NotificationSink,
    subscription_timeout: Duration,
    listeners: DashMap<SchemaPath, ListenerRegistration>,
    /// Serializes subscription attempts.
    activation: Mutex<()>,
    /// Keeps listener registration and the scan-and-remove of
    /// unregistration atomic with respect to each other.
    topics: Mutex<()>,
}

impl StreamRegistration {
    pub fn new(
        node_id: NodeId,
        stream: Stream,
        urn_prefix: impl Into<String>,
        services: DeviceServices,
        sink: NotificationSink,
        subscription_timeout: Duration,
    ) -> Self {
        Self {
            base: RegistrationBase::new(
                NotificationSourceType::NetconfDeviceStream,
                stream.name.clone(),
                urn_prefix,
                stream.replay_support,
            ),
            node_id,
            stream,
            services,
            sink,
            subscription_timeout,
            listeners: DashMap::new(),
            activation: Mutex::new(()),
            topics: Mutex::new(()),
        }
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Number of live notification listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    async fn subscribe(&self, replay: bool) {
        let _guard = self.activation.lock().await;
        if self.is_active() {
            return;
        }

        let start_time = self.replay_start(replay);
        let input = create_subscription_input(&self.stream.name, start_time);
        let call = self.services.rpc.invoke_rpc(&create_subscription_rpc(), input);

        match tokio::time::timeout(self.subscription_timeout, call).await {
            Ok(Ok(result)) if result.is_successful() => {
                self.base.set_active(true);
                info!(
                    node_id = %self.node_id,
                    stream = %self.stream.name,
                    replay_from = ?start_time,
                    "stream subscribed"
                );
            }
            Ok(Ok(result)) => warn!(
                node_id = %self.node_id,
                stream = %self.stream.name,
                errors = ?result.errors,
                "create-subscription rejected"
            ),
            Ok(Err(e)) => warn!(
                node_id = %self.node_id,
                stream = %self.stream.name,
                error = %e,
                "create-subscription failed"
            ),
            Err(_) => warn!(
                node_id = %self.node_id,
                stream = %self.stream.name,
                timeout = ?self.subscription_timeout,
                "create-subscription timed out"
            ),
        }
    }

    fn replay_start(&self, replay: bool) -> Option<DateTime<Utc>> {
        if replay && self.is_replay_supported() {
            self.last_event_time()
        } else {
            None
        }
    }

    async fn register_topic(&self, path: SchemaPath, topic_id: TopicId) -> bool {
        if !self.check_notification_path(&path) {
            return false;
        }
        if !self.is_active() {
            self.subscribe(false).await;
        }
        if !self.is_active() {
            debug!(
                node_id = %self.node_id,
                stream = %self.stream.name,
                topic = %topic_id,
                "stream inactive, topic not registered"
            );
            return false;
        }

        let _guard = self.topics.lock().await;
        if !self.listeners.contains_key(&path) {
            match self.services.notifications.register_listener(&path, self.sink.clone()) {
                Ok(registration) => {
                    self.listeners.insert(path.clone(), registration);
                }
                Err(e) => {
                    warn!(node_id = %self.node_id, path = %path, error = %e, "listener registration failed");
                    return false;
                }
            }
        }
        self.base.add_topic(path, topic_id);
        true
    }

    async fn unregister_topic(&self, topic_id: TopicId) {
        let _guard = self.topics.lock().await;
        for path in self.base.remove_topic(&topic_id) {
            if let Some((_, registration)) = self.listeners.remove(&path) {
                registration.close();
            }
        }
    }

    async fn close_all(&self) {
        let _guard = self.topics.lock().await;
        for entry in self.listeners.iter() {
            entry.value().close();
        }
        self.listeners.clear();
        self.base.clear_topics();
        self.base.set_active(false);
    }
}

impl NotificationTopicRegistration for StreamRegistration {
    fn base(&self) -> &RegistrationBase {
        &self.base
    }

    fn activate_notification_source(&self) -> BoxFuture<'_, ()> {
        self.subscribe(false).boxed()
    }

    /// The device session is gone, and its subscription with it.
    fn deactivate_notification_source(&self) -> BoxFuture<'_, ()> {
        self.base.set_active(false);
        futures_util::future::ready(()).boxed()
    }

    /// Resubscribes, replaying from the last seen event when the stream
    /// supports it.
    fn reactivate_notification_source(&self) -> BoxFuture<'_, ()> {
        self.subscribe(true).boxed()
    }

    fn register_notification_topic(&self, path: SchemaPath, topic_id: TopicId) -> BoxFuture<'_, bool> {
        self.register_topic(path, topic_id).boxed()
    }

    fn unregister_notification_topic(&self, topic_id: TopicId) -> BoxFuture<'_, ()> {
        self.unregister_topic(topic_id).boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.close_all().boxed()
    }
}
