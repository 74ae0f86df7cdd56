// ── Topology manager ──
//
// Glues the device actors, the aggregator and the topology writer
// together. On the master replica every lifecycle operation fans out to
// this replica and every peer, and the combined result is what gets
// written to the operational store. Other replicas act on their local
// actors only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use ncstack_api::{DeviceConfig, DeviceTransport, NodeId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::OperationalStateAggregator;
use crate::config::TopologyConfig;
use crate::device::{ClusterServices, DeviceContext, DeviceHandle, handler};
use crate::error::CoreError;
use crate::model::{CapabilityInterner, OperationalNode};
use crate::store::DataBroker;
use crate::writer::TopologyWriter;

type NodeFuture = BoxFuture<'static, Result<OperationalNode, CoreError>>;
type UnitFuture = BoxFuture<'static, Result<(), CoreError>>;

/// Another cluster member able to manage devices. Every call acts on that
/// member's local device actors only.
pub trait Replica: Send + Sync {
    fn replica_id(&self) -> &str;

    fn node_created(&self, config: DeviceConfig) -> NodeFuture;

    fn node_updated(&self, config: DeviceConfig) -> NodeFuture;

    fn node_deleted(&self, node_id: &NodeId) -> UnitFuture;

    fn current_status(&self, node_id: &NodeId) -> NodeFuture;
}

/// Cheaply cloneable manager of one topology on one replica.
#[derive(Clone)]
pub struct TopologyManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: TopologyConfig,
    context: DeviceContext,
    devices: DashMap<NodeId, DeviceHandle>,
    configs: DashMap<NodeId, DeviceConfig>,
    /// Other replicas, in registration order.
    peers: ArcSwap<Vec<Arc<dyn Replica>>>,
    aggregator: OperationalStateAggregator,
    writer: TopologyWriter,
    /// Serializes the read-combine-write sequences of one node so a stale
    /// result never lands after a newer one.
    write_locks: DashMap<NodeId, Arc<tokio::sync::Mutex<()>>>,
    is_master: AtomicBool,
    cancel: CancellationToken,
    status_rx: Mutex<Option<mpsc::UnboundedReceiver<NodeId>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Actor task of each live device.
    device_tasks: DashMap<NodeId, JoinHandle<()>>,
}

impl TopologyManager {
    /// Builds a manager that starts out as master. Call
    /// [`start`](Self::start) to begin processing status changes.
    pub fn new(
        config: TopologyConfig,
        transport: Arc<dyn DeviceTransport>,
        cluster: ClusterServices,
        broker: Arc<dyn DataBroker>,
    ) -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let context = DeviceContext {
            replica_id: config.replica_id.clone(),
            transport,
            cluster,
            interner: Arc::new(CapabilityInterner::new()),
            status_tx,
            channel_size: config.device_channel_size,
        };

        Self {
            inner: Arc::new(ManagerInner {
                aggregator: OperationalStateAggregator::new(config.topology_id.clone()),
                writer: TopologyWriter::new(config.topology_id.clone(), broker),
                config,
                context,
                devices: DashMap::new(),
                configs: DashMap::new(),
                peers: ArcSwap::from_pointee(Vec::new()),
                write_locks: DashMap::new(),
                is_master: AtomicBool::new(true),
                cancel: CancellationToken::new(),
                status_rx: Mutex::new(Some(status_rx)),
                task_handles: Mutex::new(Vec::new()),
                device_tasks: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.inner.config
    }

    pub fn writer(&self) -> &TopologyWriter {
        &self.inner.writer
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawns the task that turns device status changes into store
    /// updates. Calling it twice is a no-op.
    pub fn start(&self) {
        let Some(mut status_rx) = lock(&self.inner.status_rx).take() else {
            return;
        };
        let manager = self.clone();
        let cancel = self.inner.cancel.child_token();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    node_id = status_rx.recv() => {
                        let Some(node_id) = node_id else { break };
                        if let Err(e) = manager.notify_node_status_change(&node_id).await {
                            warn!(node_id = %node_id, error = %e, "status change not persisted");
                        }
                    }
                }
            }
        });
        lock(&self.inner.task_handles).push(handle);
        info!(topology = %self.inner.config.topology_id, replica = %self.inner.config.replica_id, "topology manager started");
    }

    /// Stops background tasks and every device actor.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<_> = lock(&self.inner.task_handles).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        let node_ids: Vec<NodeId> = self
            .inner
            .device_tasks
            .iter()
            .map(|task| task.key().clone())
            .collect();
        for node_id in node_ids {
            if let Some((_, task)) = self.inner.device_tasks.remove(&node_id) {
                let _ = task.await;
            }
        }
        self.inner.devices.clear();
        debug!(topology = %self.inner.config.topology_id, "topology manager stopped");
    }

    // ── Cluster membership ───────────────────────────────────────────

    pub fn add_peer(&self, peer: Arc<dyn Replica>) {
        self.inner.peers.rcu(|peers| {
            let mut peers = Vec::clone(peers);
            peers.push(Arc::clone(&peer));
            peers
        });
    }

    pub fn is_master(&self) -> bool {
        self.inner.is_master.load(Ordering::SeqCst)
    }

    pub fn set_master(&self, is_master: bool) {
        let was_master = self.inner.is_master.swap(is_master, Ordering::SeqCst);
        if was_master != is_master {
            info!(topology = %self.inner.config.topology_id, is_master, "topology ownership changed");
        }
    }

    // ── Node lifecycle ───────────────────────────────────────────────

    /// A node appeared in the configuration. A repeated create for a known
    /// node is handled as an update.
    pub async fn on_node_created(&self, config: DeviceConfig) -> Result<OperationalNode, CoreError> {
        if self.inner.configs.contains_key(&config.node_id) {
            debug!(node_id = %config.node_id, "node already known, updating instead");
            return self.on_node_updated(config).await;
        }
        self.create(config).await
    }

    /// The master recreates the node everywhere; other replicas reconnect
    /// their local actor.
    pub async fn on_node_updated(&self, config: DeviceConfig) -> Result<OperationalNode, CoreError> {
        if !self.is_master() {
            self.inner.configs.insert(config.node_id.clone(), config.clone());
            return self.local_update(config).await;
        }
        self.on_node_deleted(&config.node_id).await?;
        self.create(config).await
    }

    pub async fn on_node_deleted(&self, node_id: &NodeId) -> Result<(), CoreError> {
        self.inner.configs.remove(node_id);
        if !self.is_master() {
            return self.local_delete(node_id).await;
        }

        let mut attempts = vec![self.local_delete(node_id)];
        attempts.extend(self.peers().iter().map(|peer| peer.node_deleted(node_id)));
        self.inner.aggregator.combine_delete_attempts(attempts).await?;

        let lock = self.write_lock(node_id);
        let _guard = lock.lock().await;
        self.inner.write_locks.remove(node_id);
        self.inner.writer.delete(node_id).await
    }

    /// Re-aggregates and persists the state of `node_id` after one of its
    /// actors reported a transition. Ignored on non-master replicas.
    pub async fn notify_node_status_change(&self, node_id: &NodeId) -> Result<(), CoreError> {
        if !self.is_master() {
            debug!(node_id = %node_id, "not master, status change left to the master");
            return Ok(());
        }
        let lock = self.write_lock(node_id);
        let _guard = lock.lock().await;
        let Some(config) = self.inner.configs.get(node_id).map(|c| c.value().clone()) else {
            debug!(node_id = %node_id, "status change for removed node ignored");
            return Ok(());
        };
        self.persist_current_status(&config, false).await.map(drop)
    }

    /// Last state published by the local actor of `node_id`.
    pub fn device_status(&self, node_id: &NodeId) -> Option<Arc<OperationalNode>> {
        self.inner.devices.get(node_id)?.current_status()
    }

    pub fn device(&self, node_id: &NodeId) -> Option<DeviceHandle> {
        self.inner.devices.get(node_id).map(|h| h.value().clone())
    }

    pub fn device_count(&self) -> usize {
        self.inner.devices.len()
    }

    /// Background tasks plus device actors currently tracked.
    pub fn task_count(&self) -> usize {
        lock(&self.inner.task_handles).len() + self.inner.device_tasks.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn create(&self, config: DeviceConfig) -> Result<OperationalNode, CoreError> {
        let node_id = config.node_id.clone();
        self.inner.configs.insert(node_id.clone(), config.clone());
        if !self.is_master() {
            return self.local_create(config).await;
        }

        let mut attempts: Vec<NodeFuture> = vec![self.local_create(config.clone())];
        attempts.extend(self.peers().iter().map(|peer| peer.node_created(config.clone())));
        let created = self.inner.aggregator.combine_create_attempts(attempts).await;

        let lock = self.write_lock(&node_id);
        let _guard = lock.lock().await;
        match created {
            // Callbacks handled while the attempts were in flight may already
            // have been persisted; write what the replicas report now.
            Ok(_) => self.persist_current_status(&config, true).await,
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "create aggregation failed, writing failed state");
                self.write_failed_state(&config).await?;
                Err(e)
            }
        }
    }

    /// Combines the live status of every replica and writes it. Callers hold
    /// the node's write lock.
    async fn persist_current_status(
        &self,
        config: &DeviceConfig,
        init: bool,
    ) -> Result<OperationalNode, CoreError> {
        let node_id = &config.node_id;
        let mut attempts: Vec<NodeFuture> = vec![self.local_status(node_id)];
        attempts.extend(self.peers().iter().map(|peer| peer.current_status(node_id)));
        match self.inner.aggregator.combine_update_attempts(attempts).await {
            Ok(node) => {
                if init {
                    self.inner.writer.init(node_id, node.clone()).await?;
                } else {
                    self.inner.writer.update(node_id, node.clone()).await?;
                }
                Ok(node)
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "status aggregation failed, writing failed state");
                self.write_failed_state(config).await?;
                Err(e)
            }
        }
    }

    fn write_lock(&self, node_id: &NodeId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.inner.write_locks.entry(node_id.clone()).or_default().value())
    }

    async fn write_failed_state(&self, config: &DeviceConfig) -> Result<(), CoreError> {
        let node = handler::failed_state(config, &self.inner.config.replica_id);
        self.inner.writer.update(&config.node_id, node).await
    }

    fn peers(&self) -> Arc<Vec<Arc<dyn Replica>>> {
        self.inner.peers.load_full()
    }

    fn local_device(&self, node_id: &NodeId) -> DeviceHandle {
        if let Some(handle) = self.inner.devices.get(node_id).filter(|h| !h.is_closed()) {
            return handle.value().clone();
        }
        let (handle, task) = DeviceHandle::spawn(
            node_id.clone(),
            self.inner.context.clone(),
            self.inner.cancel.child_token(),
        );
        self.inner.device_tasks.insert(node_id.clone(), task);
        self.inner.devices.insert(node_id.clone(), handle.clone());
        handle
    }

    fn local_create(&self, config: DeviceConfig) -> NodeFuture {
        let handle = self.local_device(&config.node_id);
        async move { handle.create(config).await }.boxed()
    }

    fn local_update(&self, config: DeviceConfig) -> NodeFuture {
        let handle = self.local_device(&config.node_id);
        async move { handle.update(config).await }.boxed()
    }

    fn local_delete(&self, node_id: &NodeId) -> UnitFuture {
        let handle = self.inner.devices.remove(node_id).map(|(_, h)| h);
        // The actor ends on delete; its task needs no join.
        self.inner.device_tasks.remove(node_id);
        async move {
            match handle {
                Some(handle) => handle.delete().await,
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn local_status(&self, node_id: &NodeId) -> NodeFuture {
        let result = self
            .device_status(node_id)
            .map(|node| node.as_ref().clone())
            .ok_or_else(|| CoreError::DeviceNotFound {
                node_id: node_id.to_string(),
            });
        futures_util::future::ready(result).boxed()
    }
}

/// A manager serves as a peer replica of other managers: each call acts on
/// its local actors only.
impl Replica for TopologyManager {
    fn replica_id(&self) -> &str {
        &self.inner.config.replica_id
    }

    fn node_created(&self, config: DeviceConfig) -> NodeFuture {
        self.inner.configs.insert(config.node_id.clone(), config.clone());
        self.local_create(config)
    }

    fn node_updated(&self, config: DeviceConfig) -> NodeFuture {
        self.inner.configs.insert(config.node_id.clone(), config.clone());
        self.local_update(config)
    }

    fn node_deleted(&self, node_id: &NodeId) -> UnitFuture {
        self.inner.configs.remove(node_id);
        self.local_delete(node_id)
    }

    fn current_status(&self, node_id: &NodeId) -> NodeFuture {
        self.local_status(node_id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
