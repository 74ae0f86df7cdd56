// Shared fakes for the integration tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use ncstack_api::{
    DeviceCapabilities, DeviceConfig, DeviceEvent, DeviceEventSink, DeviceNotification,
    DeviceServices, DeviceTransport, Error, Host, ListenerRegistration, NOTIFICATION_CAPABILITY_PREFIX,
    NodeId, NotificationService, NotificationSink, QName, RpcResult, RpcService, SchemaContext,
    SchemaPath, SessionPreferences, Stream, XmlElement,
};
use tokio_util::sync::CancellationToken;

pub fn device(id: &str) -> DeviceConfig {
    DeviceConfig::new(id, Host::Domain(format!("{id}.lab")), 830)
}

pub fn notification_capabilities() -> DeviceCapabilities {
    DeviceCapabilities {
        non_module: vec![format!("{NOTIFICATION_CAPABILITY_PREFIX}:1.0")],
        ..DeviceCapabilities::default()
    }
}

/// Polls `condition` for up to a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// ── Transport ────────────────────────────────────────────────────────

/// Connects (or refuses) every device and keeps the connection listeners
/// so tests can play transport callbacks.
pub struct ScriptedTransport {
    connect_ok: bool,
    capabilities: DeviceCapabilities,
    sinks: Mutex<Vec<(NodeId, DeviceEventSink)>>,
    connects: Mutex<usize>,
    disconnects: Mutex<usize>,
}

impl ScriptedTransport {
    pub fn connecting() -> Arc<Self> {
        Arc::new(Self::new(true))
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self::new(false))
    }

    fn new(connect_ok: bool) -> Self {
        Self {
            connect_ok,
            capabilities: notification_capabilities(),
            sinks: Mutex::new(Vec::new()),
            connects: Mutex::new(0),
            disconnects: Mutex::new(0),
        }
    }

    pub fn emit(&self, node_id: &NodeId, event: DeviceEvent) {
        let sinks = self.sinks.lock().unwrap();
        let (_, sink) = sinks.iter().rev().find(|(id, _)| id == node_id).unwrap();
        sink.send(event).unwrap();
    }

    pub fn connect_count(&self) -> usize {
        *self.connects.lock().unwrap()
    }

    pub fn disconnect_count(&self) -> usize {
        *self.disconnects.lock().unwrap()
    }
}

impl DeviceTransport for ScriptedTransport {
    fn connect(&self, config: DeviceConfig) -> BoxFuture<'static, Result<DeviceCapabilities, Error>> {
        *self.connects.lock().unwrap() += 1;
        let result = if self.connect_ok {
            Ok(self.capabilities.clone())
        } else {
            Err(Error::ConnectFailed {
                node_id: config.node_id.to_string(),
                reason: "connection refused".into(),
            })
        };
        future::ready(result).boxed()
    }

    fn disconnect(&self, _node_id: &NodeId) -> BoxFuture<'static, Result<(), Error>> {
        *self.disconnects.lock().unwrap() += 1;
        future::ready(Ok(())).boxed()
    }

    fn register_connection_status_listener(
        &self,
        node_id: &NodeId,
        sink: DeviceEventSink,
    ) -> ListenerRegistration {
        self.sinks.lock().unwrap().push((node_id.clone(), sink));
        ListenerRegistration::new(CancellationToken::new())
    }
}

// ── Device services ──────────────────────────────────────────────────

/// A device that accepts every subscription and lets tests push
/// notifications to whoever listens.
#[derive(Default)]
pub struct FakeDevice {
    rpcs: Mutex<Vec<QName>>,
    listeners: Mutex<Vec<(SchemaPath, NotificationSink, CancellationToken)>>,
}

impl FakeDevice {
    pub fn rpc_count(&self) -> usize {
        self.rpcs.lock().unwrap().len()
    }

    /// Sends `notification` to every open listener of its path and returns
    /// how many received it.
    pub fn notify(&self, notification: &DeviceNotification) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _, token)| *path == notification.path && !token.is_cancelled())
            .filter(|(_, sink, _)| sink.send(notification.clone()).is_ok())
            .count()
    }
}

impl RpcService for FakeDevice {
    fn invoke_rpc(&self, rpc: &QName, _input: XmlElement) -> BoxFuture<'static, Result<RpcResult, Error>> {
        self.rpcs.lock().unwrap().push(rpc.clone());
        future::ready(Ok(RpcResult::ok(None))).boxed()
    }
}

impl NotificationService for FakeDevice {
    fn register_listener(
        &self,
        path: &SchemaPath,
        sink: NotificationSink,
    ) -> Result<ListenerRegistration, Error> {
        let token = CancellationToken::new();
        self.listeners
            .lock()
            .unwrap()
            .push((path.clone(), sink, token.clone()));
        Ok(ListenerRegistration::new(token))
    }

    fn available_streams(&self) -> BoxFuture<'static, Result<Vec<Stream>, Error>> {
        future::ready(Ok(vec![Stream::new("NETCONF").with_replay()])).boxed()
    }
}

/// `Connected` callback exposing `device` and a schema with `notifications`.
pub fn connected(device: &Arc<FakeDevice>, notifications: Vec<SchemaPath>) -> DeviceEvent {
    let rpc: Arc<dyn RpcService> = device.clone();
    let notification_service: Arc<dyn NotificationService> = device.clone();
    DeviceEvent::Connected {
        schema: SchemaContext::with_notifications(notifications),
        preferences: SessionPreferences {
            session_id: Some(1),
            capabilities: notification_capabilities(),
        },
        services: DeviceServices {
            rpc,
            notifications: notification_service,
        },
    }
}
