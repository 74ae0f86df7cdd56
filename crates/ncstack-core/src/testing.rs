// ── In-crate test doubles ──
//
// Fake collaborators shared by the unit tests of the topic, device and
// event source modules.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use ncstack_api::{
    DeviceCapabilities, DeviceConfig, DeviceEvent, DeviceEventSink, DeviceServices,
    DeviceTransport, Error, ListenerRegistration, NodeId, NotificationService, NotificationSink,
    QName, RpcResult, RpcService, SchemaPath, Stream, XmlElement,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RpcBehavior {
    Succeed,
    Fail,
    /// Never answers.
    Hang,
}

pub(crate) struct FakeRpc {
    behavior: Mutex<RpcBehavior>,
    inputs: Mutex<Vec<XmlElement>>,
}

impl FakeRpc {
    pub(crate) fn new(behavior: RpcBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_behavior(&self, behavior: RpcBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn call_count(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub(crate) fn inputs(&self) -> Vec<XmlElement> {
        self.inputs.lock().unwrap().clone()
    }
}

impl RpcService for FakeRpc {
    fn invoke_rpc(&self, rpc: &QName, input: XmlElement) -> BoxFuture<'static, Result<RpcResult, Error>> {
        self.inputs.lock().unwrap().push(input);
        match *self.behavior.lock().unwrap() {
            RpcBehavior::Succeed => future::ready(Ok(RpcResult::ok(None))).boxed(),
            RpcBehavior::Fail => future::ready(Err(Error::Rpc {
                rpc: rpc.name.clone(),
                message: "stream not found".into(),
            }))
            .boxed(),
            RpcBehavior::Hang => future::pending().boxed(),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeNotifications {
    streams: Vec<Stream>,
    listeners: Mutex<Vec<(SchemaPath, NotificationSink, CancellationToken)>>,
}

impl FakeNotifications {
    pub(crate) fn with_streams(streams: Vec<Stream>) -> Self {
        Self {
            streams,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub(crate) fn listener_closed(&self, index: usize) -> bool {
        self.listeners.lock().unwrap()[index].2.is_cancelled()
    }

    /// Sink of the first open listener for `path`.
    pub(crate) fn sink_for(&self, path: &SchemaPath) -> Option<NotificationSink> {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _, token)| p == path && !token.is_cancelled())
            .map(|(_, sink, _)| sink.clone())
    }
}

impl NotificationService for FakeNotifications {
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
        future::ready(Ok(self.streams.clone())).boxed()
    }
}

pub(crate) fn services(rpc: &Arc<FakeRpc>, notifications: &Arc<FakeNotifications>) -> DeviceServices {
    let rpc: Arc<dyn RpcService> = rpc.clone();
    let notifications: Arc<dyn NotificationService> = notifications.clone();
    DeviceServices { rpc, notifications }
}

// ── Transport ────────────────────────────────────────────────────────

/// Transport whose connect outcome is fixed per test. Connection listeners
/// are kept so tests can inject callbacks.
pub(crate) struct FakeTransport {
    connect_ok: bool,
    capabilities: DeviceCapabilities,
    sinks: Mutex<Vec<(NodeId, DeviceEventSink)>>,
    connects: Mutex<Vec<NodeId>>,
    disconnects: Mutex<Vec<NodeId>>,
    /// Holds the next connect result back until fired.
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeTransport {
    pub(crate) fn connecting(capabilities: DeviceCapabilities) -> Self {
        Self {
            connect_ok: true,
            capabilities,
            sinks: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    /// Like [`connecting`](Self::connecting), but the first connect only
    /// resolves once the returned sender fires.
    pub(crate) fn gated(capabilities: DeviceCapabilities) -> (Self, oneshot::Sender<()>) {
        let (open, gate) = oneshot::channel();
        let transport = Self::connecting(capabilities);
        *transport.gate.lock().unwrap() = Some(gate);
        (transport, open)
    }

    pub(crate) fn failing() -> Self {
        Self {
            connect_ok: false,
            ..Self::connecting(DeviceCapabilities::default())
        }
    }

    /// Delivers `event` to the newest listener of `node_id`.
    pub(crate) fn emit(&self, node_id: &NodeId, event: DeviceEvent) {
        let sinks = self.sinks.lock().unwrap();
        let (_, sink) = sinks.iter().rev().find(|(id, _)| id == node_id).unwrap();
        sink.send(event).unwrap();
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub(crate) fn disconnect_count(&self) -> usize {
        self.disconnects.lock().unwrap().len()
    }
}

impl DeviceTransport for FakeTransport {
    fn connect(&self, config: DeviceConfig) -> BoxFuture<'static, Result<DeviceCapabilities, Error>> {
        self.connects.lock().unwrap().push(config.node_id.clone());
        let result = if self.connect_ok {
            Ok(self.capabilities.clone())
        } else {
            Err(Error::ConnectFailed {
                node_id: config.node_id.to_string(),
                reason: "connection refused".into(),
            })
        };
        match self.gate.lock().unwrap().take() {
            Some(gate) => async move {
                let _ = gate.await;
                result
            }
            .boxed(),
            None => future::ready(result).boxed(),
        }
    }

    fn disconnect(&self, node_id: &NodeId) -> BoxFuture<'static, Result<(), Error>> {
        self.disconnects.lock().unwrap().push(node_id.clone());
        future::ready(Ok(())).boxed()
    }

    fn register_connection_status_listener(
        &self,
        node_id: &NodeId,
        sink: DeviceEventSink,
    ) -> ListenerRegistration {
        self.sinks.lock().unwrap().push((node_id.clone(), sink));
        ListenerRegistration::detached()
    }
}
