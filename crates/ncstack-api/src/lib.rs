//! Southbound collaborator surface for the ncstack management plane.
//!
//! This crate does not speak NETCONF on the wire. It defines the narrow
//! interface the core drives a NETCONF client through, together with the
//! value types that cross that boundary:
//!
//! - **[`DeviceTransport`]**: connect / disconnect a device and deliver
//!   [`DeviceEvent`] callbacks (connected, disconnected, failed) through a
//!   channel sink.
//!
//! - **[`RpcService`]**: invoke an RPC on a connected device, e.g. the
//!   RFC 5277 `create-subscription` built by [`create_subscription_input`].
//!
//! - **[`NotificationService`]**: register a listener for one notification
//!   type, returning a close-on-drop [`ListenerRegistration`].
//!
//! - **Wire types**: [`XmlElement`] trees, [`QName`] / [`SchemaPath`],
//!   capability and stream descriptions, and the per-device
//!   [`DeviceConfig`] whose credentials never show up in `Debug` output.

pub mod capability;
pub mod error;
pub mod node;
pub mod schema;
pub mod stream;
pub mod transport;
pub mod xml;

pub use capability::{
    DeviceCapabilities, FailureReason, NOTIFICATION_CAPABILITY_PREFIX, SessionPreferences,
};
pub use error::Error;
pub use node::{
    CREDENTIALS_REDACTED, Credentials, DeviceConfig, Host, NodeId, ReconnectConfig, TopologyId,
};
pub use schema::{QName, SchemaContext, SchemaPath};
pub use stream::Stream;
pub use transport::{
    DeviceEvent, DeviceEventSink, DeviceNotification, DeviceServices, DeviceTransport,
    ListenerRegistration, NOTIFICATION_NAMESPACE, NotificationService, NotificationSink,
    RpcResult, RpcService, create_subscription_input, create_subscription_rpc,
};
pub use xml::{XmlAttribute, XmlElement};
