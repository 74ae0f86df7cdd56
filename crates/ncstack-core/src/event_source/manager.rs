// ── Event source manager ──
//
// Follows the operational topology and keeps one event source per
// connected, notification-capable device. Sources survive disconnects
// (deactivated, not dropped) so replay can resume from the last event.
// Waiting for a mount point happens in a per-device task so one slow
// device never holds up the change feed.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ncstack_api::NodeId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::EventSourceRegistry;
use super::source::NetconfEventSource;
use crate::bus::TopicBus;
use crate::config::TopologyConfig;
use crate::device::MountPointRegistry;
use crate::model::OperationalNode;
use crate::store::DataTreeChange;

#[derive(Clone)]
pub struct EventSourceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: TopologyConfig,
    mounts: Arc<MountPointRegistry>,
    registry: EventSourceRegistry,
    bus: TopicBus,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Source creations still waiting for their device's mount point.
    pending: DashMap<NodeId, PendingSource>,
}

struct PendingSource {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventSourceManager {
    pub fn new(
        config: TopologyConfig,
        mounts: Arc<MountPointRegistry>,
        registry: EventSourceRegistry,
        bus: TopicBus,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                mounts,
                registry,
                bus,
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                pending: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &EventSourceRegistry {
        &self.inner.registry
    }

    pub fn bus(&self) -> &TopicBus {
        &self.inner.bus
    }

    /// Devices whose event source waits for a mount point.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Consumes `changes` in a background task until shutdown.
    pub fn start(&self, mut changes: broadcast::Receiver<DataTreeChange>) {
        let manager = self.clone();
        let cancel = self.inner.cancel.child_token();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => manager.on_data_tree_change(&change).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event source manager lagged behind topology changes");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        let previous = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(topology = %self.inner.config.topology_id, "event source manager started");
    }

    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        let node_ids: Vec<NodeId> = self
            .inner
            .pending
            .iter()
            .map(|pending| pending.key().clone())
            .collect();
        for node_id in node_ids {
            if let Some((_, pending)) = self.inner.pending.remove(&node_id) {
                let _ = pending.task.await;
            }
        }
        self.inner.registry.close_all().await;
        debug!(topology = %self.inner.config.topology_id, "event source manager stopped");
    }

    // ── Change handling ──────────────────────────────────────────────

    pub async fn on_data_tree_change(&self, change: &DataTreeChange) {
        if change.topology() != &self.inner.config.topology_id {
            return;
        }
        match change {
            DataTreeChange::Created { node, .. } => self.on_node_changed(None, node).await,
            DataTreeChange::Updated { before, after, .. } => self.on_node_changed(Some(before), after).await,
            DataTreeChange::Removed { node, .. } => {
                self.cancel_pending(&node.node_id);
                if let Some(source) = self.inner.registry.unregister(&node.node_id) {
                    source.close().await;
                    info!(node_id = %node.node_id, "event source removed");
                }
            }
        }
    }

    async fn on_node_changed(&self, before: Option<&OperationalNode>, node: &OperationalNode) {
        let was_connected = before.is_some_and(OperationalNode::is_connected);
        let existing = self.inner.registry.get(&node.node_id);

        if !node.is_connected() {
            self.cancel_pending(&node.node_id);
            if let (true, Some(source)) = (was_connected, existing) {
                source.de_activate_streams().await;
            }
            return;
        }

        if let Some(source) = existing {
            if !was_connected {
                source.re_activate_streams().await;
            }
            return;
        }

        if !node.advertises(&self.inner.config.notification_capability_prefix) {
            debug!(node_id = %node.node_id, "device has no notification capability, not an event source");
            return;
        }
        match self.inner.pending.entry(node.node_id.clone()) {
            Entry::Occupied(_) => {
                debug!(node_id = %node.node_id, "event source creation already pending");
            }
            Entry::Vacant(slot) => {
                let cancel = self.inner.cancel.child_token();
                let manager = self.clone();
                let node_id = node.node_id.clone();
                let token = cancel.clone();
                let task = tokio::spawn(async move { manager.create_source(node_id, token).await });
                slot.insert(PendingSource { cancel, task });
            }
        }
    }

    /// Waits for the mount point of `node_id` and registers its source,
    /// unless the device disconnects or goes away first.
    async fn create_source(&self, node_id: NodeId, cancel: CancellationToken) {
        let timeout = self.inner.config.mount_timeout;
        let mount = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            mount = self.inner.mounts.wait_for(&node_id, timeout) => {
                if mount.is_none() {
                    warn!(node_id = %node_id, timeout = ?timeout, "connected device was never mounted, no event source");
                }
                mount
            }
        };
        let registered = mount.is_some();
        if let Some(mount) = mount {
            let source = NetconfEventSource::new(&mount, &self.inner.config, self.inner.bus.clone()).await;
            if let Some(previous) = self.inner.registry.register(source) {
                previous.close().await;
            }
        }

        if cancel.is_cancelled() {
            // The device went away while the source was being built.
            if let Some(source) = registered.then(|| self.inner.registry.unregister(&node_id)).flatten() {
                source.close().await;
            }
            debug!(node_id = %node_id, "event source creation cancelled");
            return;
        }
        // Not cancelled, so the entry is still ours.
        self.inner.pending.remove(&node_id);
    }

    fn cancel_pending(&self, node_id: &NodeId) {
        if let Some((_, pending)) = self.inner.pending.remove(node_id) {
            pending.cancel.cancel();
            debug!(node_id = %node_id, "pending event source creation cancelled");
        }
    }
}
