// ── Notification topic registrations ──
//
// A registration owns one source of notifications on a device (its
// connection status, or one NETCONF stream) and maps notification paths to
// the topics subscribed to them. Event sources drive registrations only
// through the `NotificationTopicRegistration` trait.

mod connection;
mod stream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use indexmap::IndexSet;
use ncstack_api::SchemaPath;
use strum::Display;

use crate::bus::TopicId;

pub use connection::{
    ConnectionStatusRegistration, EVENT_SOURCE_STATUS_NAMESPACE, EventSourceStatus,
    event_source_status_path,
};
pub use stream::StreamRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum NotificationSourceType {
    ConnectionStatusChange,
    NetconfDeviceStream,
}

// ── Shared state ─────────────────────────────────────────────────────

/// State every registration variant carries.
#[derive(Debug)]
pub struct RegistrationBase {
    source_type: NotificationSourceType,
    source_name: String,
    urn_prefix: String,
    replay_supported: bool,
    active: AtomicBool,
    last_event_time: Mutex<Option<DateTime<Utc>>>,
    /// Notification path -> topics subscribed to it, in join order.
    topics: DashMap<SchemaPath, IndexSet<TopicId>>,
}

impl RegistrationBase {
    pub fn new(
        source_type: NotificationSourceType,
        source_name: impl Into<String>,
        urn_prefix: impl Into<String>,
        replay_supported: bool,
    ) -> Self {
        Self {
            source_type,
            source_name: source_name.into(),
            urn_prefix: urn_prefix.into(),
            replay_supported,
            active: AtomicBool::new(false),
            last_event_time: Mutex::new(None),
            topics: DashMap::new(),
        }
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub(crate) fn add_topic(&self, path: SchemaPath, topic_id: TopicId) {
        self.topics.entry(path).or_default().insert(topic_id);
    }

    /// Removes `topic_id` everywhere and returns the paths left without
    /// any topic (their entries are dropped).
    pub(crate) fn remove_topic(&self, topic_id: &TopicId) -> Vec<SchemaPath> {
        let mut emptied = Vec::new();
        self.topics.retain(|path, topics| {
            topics.shift_remove(topic_id);
            if topics.is_empty() {
                emptied.push(path.clone());
                false
            } else {
                true
            }
        });
        emptied
    }

    pub(crate) fn clear_topics(&self) {
        self.topics.clear();
    }

    fn topics_for(&self, path: &SchemaPath) -> Vec<TopicId> {
        self.topics
            .get(path)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ── Trait ────────────────────────────────────────────────────────────

/// One notification source of an event source.
///
/// Lifecycle hooks are asynchronous because activating a stream means a
/// `create-subscription` round trip to the device.
pub trait NotificationTopicRegistration: Send + Sync {
    fn base(&self) -> &RegistrationBase;

    fn is_active(&self) -> bool {
        self.base().active.load(Ordering::SeqCst)
    }

    fn source_type(&self) -> NotificationSourceType {
        self.base().source_type
    }

    fn source_name(&self) -> &str {
        &self.base().source_name
    }

    /// Namespace prefix of the notifications this registration owns.
    fn notification_urn_prefix(&self) -> &str {
        &self.base().urn_prefix
    }

    fn topics_for_notification(&self, path: &SchemaPath) -> Vec<TopicId> {
        self.base().topics_for(path)
    }

    /// `true` if `path` lives under this registration's URN prefix.
    fn check_notification_path(&self, path: &SchemaPath) -> bool {
        path.namespace().starts_with(self.notification_urn_prefix())
    }

    fn last_event_time(&self) -> Option<DateTime<Utc>> {
        *self
            .base()
            .last_event_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_last_event_time(&self, time: Option<DateTime<Utc>>) {
        *self
            .base()
            .last_event_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = time;
    }

    fn is_replay_supported(&self) -> bool {
        self.base().replay_supported
    }

    fn activate_notification_source(&self) -> BoxFuture<'_, ()>;

    fn deactivate_notification_source(&self) -> BoxFuture<'_, ()>;

    fn reactivate_notification_source(&self) -> BoxFuture<'_, ()>;

    /// Subscribes `topic_id` to notifications at `path`. Returns `false`
    /// when the registration could not take the topic.
    fn register_notification_topic(&self, path: SchemaPath, topic_id: TopicId) -> BoxFuture<'_, bool>;

    fn unregister_notification_topic(&self, topic_id: TopicId) -> BoxFuture<'_, ()>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use ncstack_api::QName;
    use pretty_assertions::assert_eq;

    use super::*;

    fn path(name: &str) -> SchemaPath {
        SchemaPath::of(QName::new("urn:test", name))
    }

    #[test]
    fn removing_last_topic_drops_the_path() {
        let base = RegistrationBase::new(
            NotificationSourceType::NetconfDeviceStream,
            "NETCONF",
            "urn:test",
            false,
        );
        base.add_topic(path("a"), TopicId::new("t1"));
        base.add_topic(path("a"), TopicId::new("t2"));
        base.add_topic(path("b"), TopicId::new("t1"));

        let emptied = base.remove_topic(&TopicId::new("t1"));
        assert_eq!(emptied, vec![path("b")]);
        assert_eq!(base.topics_for(&path("a")), vec![TopicId::new("t2")]);
        assert!(base.topics_for(&path("b")).is_empty());
    }
}
