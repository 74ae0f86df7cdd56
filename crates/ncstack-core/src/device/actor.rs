// ── Device actor ──
//
// One task per device owns its state machine. Callers talk to it through a
// cloneable `DeviceHandle`; transport callbacks, role changes and connect
// results arrive on their own channels and are processed strictly in
// delivery order by the same loop.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use ncstack_api::{
    DeviceCapabilities, DeviceConfig, DeviceEvent, DeviceServices, DeviceTransport,
    ListenerRegistration, NodeId, SchemaContext, SessionPreferences,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cluster::{ClusterServices, MountPoint, RoleChange};
use super::handler;
use crate::error::CoreError;
use crate::model::{CapabilityInterner, OperationalNode};

type NodeReply = oneshot::Sender<Result<OperationalNode, CoreError>>;

/// Everything a device actor shares with its siblings.
#[derive(Clone)]
pub struct DeviceContext {
    pub replica_id: String,
    pub transport: Arc<dyn DeviceTransport>,
    pub cluster: ClusterServices,
    pub interner: Arc<CapabilityInterner>,
    /// Receives the id of every device whose status changed.
    pub status_tx: mpsc::UnboundedSender<NodeId>,
    pub channel_size: usize,
}

/// Requests accepted by a device actor.
#[derive(Debug)]
pub enum DeviceMessage {
    /// Start managing the device and connect it.
    Create { config: DeviceConfig, reply: NodeReply },
    /// Disconnect, then connect under the new configuration.
    Update { config: DeviceConfig, reply: NodeReply },
    /// Tear everything down; the actor stops afterwards.
    Delete { reply: oneshot::Sender<Result<(), CoreError>> },
    RoleChanged(RoleChange),
}

/// Outcome of one connect attempt, posted back to the actor.
struct ConnectFinished {
    generation: u64,
    result: Result<DeviceCapabilities, ncstack_api::Error>,
}

/// Session state captured from the `Connected` callback.
struct Session {
    schema: SchemaContext,
    services: DeviceServices,
}

// ── Handle ───────────────────────────────────────────────────────────

/// Cheaply cloneable address of a running device actor.
#[derive(Clone)]
pub struct DeviceHandle {
    node_id: NodeId,
    tx: mpsc::Sender<DeviceMessage>,
    current: Arc<ArcSwapOption<OperationalNode>>,
    status: watch::Receiver<Option<Arc<OperationalNode>>>,
    is_master: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl DeviceHandle {
    /// Spawns the actor for `node_id`. It stops when `cancel` fires, when
    /// the device is deleted, or when every handle is dropped.
    pub fn spawn(node_id: NodeId, context: DeviceContext, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, mailbox) = mpsc::channel(context.channel_size.max(1));
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (role_tx, role_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(None);
        let current = Arc::new(ArcSwapOption::empty());
        let is_master = Arc::new(AtomicBool::new(false));

        let actor = DeviceActor {
            node_id: node_id.clone(),
            context,
            config: None,
            generation: 0,
            pending: None,
            events: None,
            callback_seen: false,
            registration: None,
            session: None,
            is_master: Arc::clone(&is_master),
            current: Arc::clone(&current),
            status: status_tx,
            finished_tx,
            role_tx,
        };
        let task = tokio::spawn(actor.run(mailbox, finished_rx, role_rx, cancel.clone()));

        let handle = Self {
            node_id,
            tx,
            current,
            status,
            is_master,
            cancel,
        };
        (handle, task)
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Connects the device. Resolves with `Connected` once the transport
    /// connects, or with the `Connecting` projection if the attempt fails
    /// (the failure itself arrives later as a transport callback).
    pub async fn create(&self, config: DeviceConfig) -> Result<OperationalNode, CoreError> {
        self.request(|reply| DeviceMessage::Create { config, reply }).await?
    }

    pub async fn update(&self, config: DeviceConfig) -> Result<OperationalNode, CoreError> {
        self.request(|reply| DeviceMessage::Update { config, reply }).await?
    }

    pub async fn delete(&self) -> Result<(), CoreError> {
        self.request(|reply| DeviceMessage::Delete { reply }).await?
    }

    pub async fn role_changed(&self, change: RoleChange) -> Result<(), CoreError> {
        self.tx
            .send(DeviceMessage::RoleChanged(change))
            .await
            .map_err(|_| self.closed())
    }

    /// Last published operational node; `None` before the first create.
    pub fn current_status(&self) -> Option<Arc<OperationalNode>> {
        self.current.load_full()
    }

    /// Whether this replica currently owns (masters) the device.
    pub fn is_master(&self) -> bool {
        self.is_master.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<OperationalNode>>> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stops the actor without deleting the device.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> DeviceMessage,
    ) -> Result<T, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(message(reply)).await.map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> CoreError {
        CoreError::HandlerClosed {
            node_id: self.node_id.to_string(),
        }
    }
}

// ── Actor ────────────────────────────────────────────────────────────

struct DeviceActor {
    node_id: NodeId,
    context: DeviceContext,
    config: Option<DeviceConfig>,
    /// Bumped on every connect attempt; stale results are ignored.
    generation: u64,
    pending: Option<(u64, NodeReply)>,
    /// Transport callbacks of the current attempt.
    events: Option<mpsc::UnboundedReceiver<DeviceEvent>>,
    /// A callback of the current attempt was handled; from then on callbacks
    /// own the state and a late connect result only answers the caller.
    callback_seen: bool,
    registration: Option<ListenerRegistration>,
    session: Option<Session>,
    is_master: Arc<AtomicBool>,
    current: Arc<ArcSwapOption<OperationalNode>>,
    status: watch::Sender<Option<Arc<OperationalNode>>>,
    finished_tx: mpsc::UnboundedSender<ConnectFinished>,
    role_tx: mpsc::UnboundedSender<RoleChange>,
}

/// Next transport callback; pends forever while no listener is registered.
async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<DeviceEvent>>) -> Option<DeviceEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl DeviceActor {
    async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<DeviceMessage>,
        mut finished: mpsc::UnboundedReceiver<ConnectFinished>,
        mut roles: mpsc::UnboundedReceiver<RoleChange>,
        cancel: CancellationToken,
    ) {
        debug!(node_id = %self.node_id, "device actor started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(done) = finished.recv() => self.on_connect_finished(done),
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.on_device_event(event),
                    // The transport dropped its sink.
                    None => self.events = None,
                },
                Some(change) = roles.recv() => self.on_role_changed(change),
                message = mailbox.recv() => {
                    let Some(message) = message else { break };
                    if self.handle(message).await.is_break() {
                        debug!(node_id = %self.node_id, "device actor stopped after delete");
                        return;
                    }
                }
            }
        }
        self.release().await;
        debug!(node_id = %self.node_id, "device actor stopped");
    }

    async fn handle(&mut self, message: DeviceMessage) -> ControlFlow<()> {
        match message {
            DeviceMessage::Create { config, reply } => {
                info!(node_id = %self.node_id, address = %config.address(), "device created");
                self.start_connect(config, reply);
            }
            DeviceMessage::Update { config, reply } => {
                info!(node_id = %self.node_id, address = %config.address(), "device updated, reconnecting");
                self.release().await;
                self.start_connect(config, reply);
            }
            DeviceMessage::Delete { reply } => {
                info!(node_id = %self.node_id, "device deleted");
                self.release().await;
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
            DeviceMessage::RoleChanged(change) => self.on_role_changed(change),
        }
        ControlFlow::Continue(())
    }

    // ── Connect sequence ─────────────────────────────────────────────

    fn start_connect(&mut self, config: DeviceConfig, reply: NodeReply) {
        self.generation += 1;
        let generation = self.generation;
        self.answer_superseded();

        // Callbacks of this attempt only; a fresh channel drops anything
        // still queued from the previous session.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.registration = Some(
            self.context
                .transport
                .register_connection_status_listener(&self.node_id, events_tx),
        );
        self.events = Some(events_rx);
        self.callback_seen = false;

        self.publish(handler::initial_state(&config, &self.context.replica_id));
        self.pending = Some((generation, reply));

        let connect = self.context.transport.connect(config.clone());
        let finished_tx = self.finished_tx.clone();
        tokio::spawn(async move {
            let result = connect.await;
            let _ = finished_tx.send(ConnectFinished { generation, result });
        });
        self.config = Some(config);
    }

    fn on_connect_finished(&mut self, done: ConnectFinished) {
        if done.generation != self.generation {
            debug!(node_id = %self.node_id, generation = done.generation, "ignoring superseded connect result");
            return;
        }
        let Some(config) = self.config.as_ref() else {
            return;
        };

        match done.result {
            Ok(capabilities) => {
                info!(node_id = %self.node_id, address = %config.address(), "device connected");
                if self.callback_seen {
                    debug!(node_id = %self.node_id, "connect result arrived after a callback, state kept");
                } else {
                    let node = handler::connected_state(
                        config,
                        &self.context.replica_id,
                        &capabilities,
                        &self.context.interner,
                    );
                    self.publish(node);
                }
            }
            Err(e) => {
                warn!(node_id = %self.node_id, address = %config.address(), error = %e, "connect attempt failed");
            }
        }

        if let Some((_, reply)) = self.pending.take() {
            let _ = reply.send(self.snapshot());
        }
    }

    /// Answers a create/update whose attempt was replaced by a newer one.
    fn answer_superseded(&mut self) {
        if let Some((_, reply)) = self.pending.take() {
            let _ = reply.send(self.snapshot());
        }
    }

    fn snapshot(&self) -> Result<OperationalNode, CoreError> {
        self.current
            .load_full()
            .map(|node| node.as_ref().clone())
            .ok_or_else(|| CoreError::illegal_state(format!("no state for device {}", self.node_id)))
    }

    // ── Transport callbacks ──────────────────────────────────────────

    fn on_device_event(&mut self, event: DeviceEvent) {
        self.callback_seen = true;
        match event {
            DeviceEvent::Connected {
                schema,
                preferences,
                services,
            } => self.on_device_connected(schema, &preferences, services),
            DeviceEvent::Disconnected => self.on_device_disconnected(),
            DeviceEvent::Failed(cause) => self.on_device_failed(cause.as_deref()),
        }
    }

    fn on_device_connected(&mut self, schema: SchemaContext, preferences: &SessionPreferences, services: DeviceServices) {
        let Some(config) = self.config.as_ref() else {
            return;
        };
        debug!(node_id = %self.node_id, session_id = ?preferences.session_id, "session up");

        let node = handler::connected_state(
            config,
            &self.context.replica_id,
            &preferences.capabilities,
            &self.context.interner,
        );
        self.session = Some(Session { schema, services });
        self.context
            .cluster
            .election
            .register_candidate(&self.node_id, self.role_tx.clone());
        self.publish(node);
        self.notify_status_change();
    }

    fn on_device_disconnected(&mut self) {
        let Some(config) = self.config.as_ref() else {
            return;
        };
        debug!(node_id = %self.node_id, "session down");

        let node = handler::disconnected_state(config, &self.context.replica_id);
        self.lose_session();
        self.publish(node);
        self.notify_status_change();
    }

    fn on_device_failed(&mut self, cause: Option<&str>) {
        let Some(config) = self.config.as_ref() else {
            return;
        };
        warn!(node_id = %self.node_id, cause = cause.unwrap_or(handler::UNKNOWN_REASON), "device failed");

        let node = handler::unable_to_connect_state(config, &self.context.replica_id, cause);
        self.lose_session();
        self.publish(node);
        self.notify_status_change();
    }

    fn lose_session(&mut self) {
        self.context.cluster.election.unregister_candidate(&self.node_id);
        self.is_master.store(false, Ordering::SeqCst);
        self.session = None;
        self.context.cluster.mount_points.unregister(&self.node_id);
    }

    // ── Roles ────────────────────────────────────────────────────────

    fn on_role_changed(&mut self, change: RoleChange) {
        if change.is_unchanged() {
            return;
        }
        // A grant queued before the session was lost.
        if change.is_owner && self.session.is_none() {
            debug!(node_id = %self.node_id, "ownership granted without a session, ignored");
            return;
        }
        self.is_master.store(change.is_owner, Ordering::SeqCst);
        if !change.is_owner {
            debug!(node_id = %self.node_id, "lost ownership");
            self.context.cluster.mount_points.unregister(&self.node_id);
            return;
        }

        debug!(node_id = %self.node_id, "became owner");
        if let Some(session) = &self.session {
            self.context.cluster.mount_points.register(MountPoint {
                node_id: self.node_id.clone(),
                schema: session.schema.clone(),
                services: session.services.clone(),
            });
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn publish(&self, node: OperationalNode) {
        debug!(node_id = %self.node_id, status = %node.connection_status, "state published");
        let node = Arc::new(node);
        self.current.store(Some(Arc::clone(&node)));
        self.status.send_replace(Some(node));
    }

    fn notify_status_change(&self) {
        // The topology manager may already be shutting down.
        let _ = self.context.status_tx.send(self.node_id.clone());
    }

    /// Leaves the election, drops the listener and mount point and
    /// disconnects the session.
    async fn release(&mut self) {
        self.context.cluster.election.unregister_candidate(&self.node_id);
        self.context.cluster.mount_points.unregister(&self.node_id);
        if let Some(registration) = self.registration.take() {
            registration.close();
        }
        self.events = None;
        self.session = None;
        self.is_master.store(false, Ordering::SeqCst);
        self.answer_superseded();

        if self.config.is_some() {
            if let Err(e) = self.context.transport.disconnect(&self.node_id).await {
                warn!(node_id = %self.node_id, error = %e, "disconnect failed");
            }
        }
    }
}
