// ── Transport collaborator surface ──
//
// The NETCONF client is external. The core drives it through these
// object-safe traits and receives its connection callbacks as
// `DeviceEvent`s on a channel sink, so the per-device actor can process
// them in delivery order.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capability::{DeviceCapabilities, SessionPreferences};
use crate::error::Error;
use crate::node::{DeviceConfig, NodeId};
use crate::schema::{QName, SchemaContext, SchemaPath};
use crate::stream::Stream;
use crate::xml::XmlElement;

/// Namespace of the RFC 5277 notification RPCs and stream elements.
pub const NOTIFICATION_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// Channel through which a transport reports connection callbacks.
pub type DeviceEventSink = mpsc::UnboundedSender<DeviceEvent>;

/// Channel through which a notification listener receives notifications.
pub type NotificationSink = mpsc::UnboundedSender<DeviceNotification>;

// ── Callbacks ────────────────────────────────────────────────────────

/// Services a connected device exposes to the rest of the system.
#[derive(Clone)]
pub struct DeviceServices {
    pub rpc: Arc<dyn RpcService>,
    pub notifications: Arc<dyn NotificationService>,
}

impl fmt::Debug for DeviceServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceServices").finish_non_exhaustive()
    }
}

/// Terminal outcomes reported by the transport for one device.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Capability negotiation completed and the session is usable.
    Connected {
        schema: SchemaContext,
        preferences: SessionPreferences,
        services: DeviceServices,
    },
    /// The session went down; the transport may be reconnecting.
    Disconnected,
    /// The transport gave up. `None` when no cause was reported.
    Failed(Option<String>),
}

// ── Traits ───────────────────────────────────────────────────────────

/// Connection management for devices. Reconnect policy lives behind this
/// trait; callers never retry on their own.
pub trait DeviceTransport: Send + Sync {
    /// Starts connecting `config.node_id` and resolves once the session is
    /// up with the negotiated capabilities.
    fn connect(&self, config: DeviceConfig) -> BoxFuture<'static, Result<DeviceCapabilities, Error>>;

    /// Tears the session down (a no-op for unknown devices).
    fn disconnect(&self, node_id: &NodeId) -> BoxFuture<'static, Result<(), Error>>;

    /// Routes connection callbacks for `node_id` into `sink` until the
    /// returned registration is closed.
    fn register_connection_status_listener(
        &self,
        node_id: &NodeId,
        sink: DeviceEventSink,
    ) -> ListenerRegistration;
}

/// Outcome of an RPC: an optional output element and any `<rpc-error>`s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcResult {
    pub output: Option<XmlElement>,
    pub errors: Vec<String>,
}

impl RpcResult {
    pub fn ok(output: Option<XmlElement>) -> Self {
        Self {
            output,
            errors: Vec::new(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }
}

pub trait RpcService: Send + Sync {
    fn invoke_rpc(&self, rpc: &QName, input: XmlElement) -> BoxFuture<'static, Result<RpcResult, Error>>;
}

/// A notification received from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNotification {
    /// Schema path of the notification definition.
    pub path: SchemaPath,
    pub body: XmlElement,
    pub event_time: DateTime<Utc>,
}

pub trait NotificationService: Send + Sync {
    /// Delivers notifications of type `path` to `sink`.
    fn register_listener(
        &self,
        path: &SchemaPath,
        sink: NotificationSink,
    ) -> Result<ListenerRegistration, Error>;

    /// Notification streams the device advertises.
    fn available_streams(&self) -> BoxFuture<'static, Result<Vec<Stream>, Error>>;
}

// ── ListenerRegistration ─────────────────────────────────────────────

/// Handle for a listener registered with a collaborator. Closing it (or
/// dropping it) cancels the underlying token; the collaborator stops
/// delivering once it observes the cancellation.
#[derive(Debug)]
pub struct ListenerRegistration {
    token: CancellationToken,
}

impl ListenerRegistration {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Registration that nothing observes, for collaborators without
    /// per-listener state.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ── create-subscription ──────────────────────────────────────────────

/// QName of the RFC 5277 `create-subscription` RPC.
pub fn create_subscription_rpc() -> QName {
    QName::new(NOTIFICATION_NAMESPACE, "create-subscription")
}

/// Builds the `<create-subscription>` input for `stream`, replaying from
/// `start_time` when given.
pub fn create_subscription_input(stream: &str, start_time: Option<DateTime<Utc>>) -> XmlElement {
    let mut input = XmlElement::qualified("create-subscription", NOTIFICATION_NAMESPACE)
        .with_child(XmlElement::qualified("stream", NOTIFICATION_NAMESPACE).with_text(stream));
    if let Some(start) = start_time {
        input = input.with_child(
            XmlElement::qualified("startTime", NOTIFICATION_NAMESPACE)
                .with_text(start.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    input
}
