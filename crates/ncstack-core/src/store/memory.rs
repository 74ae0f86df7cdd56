// ── In-memory operational store ──
//
// Thread-safe storage for operational nodes. Writes arrive through
// transaction chains; readers use snapshots, `NodeStream` subscriptions or
// the `DataTreeChange` broadcast feed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashSet;
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use ncstack_api::{NodeId, TopologyId};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::collection::NodeCollection;
use super::stream::NodeStream;
use super::{
    DataBroker, DataPath, DataValue, StoreError, TransactionChain, TransactionChainListener,
    WriteBatch, WriteOp,
};
use crate::model::OperationalNode;

const CHANGE_CHANNEL_SIZE: usize = 256;

/// One committed change to a node entry.
#[derive(Debug, Clone)]
pub enum DataTreeChange {
    Created {
        topology: TopologyId,
        node: Arc<OperationalNode>,
    },
    Updated {
        topology: TopologyId,
        before: Arc<OperationalNode>,
        after: Arc<OperationalNode>,
    },
    Removed {
        topology: TopologyId,
        node: Arc<OperationalNode>,
    },
}

impl DataTreeChange {
    pub fn topology(&self) -> &TopologyId {
        match self {
            Self::Created { topology, .. }
            | Self::Updated { topology, .. }
            | Self::Removed { topology, .. } => topology,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Created { node, .. } | Self::Removed { node, .. } => &node.node_id,
            Self::Updated { after, .. } => &after.node_id,
        }
    }
}

/// Reactive in-memory implementation of [`DataBroker`].
///
/// Cheaply cloneable; clones share the same data.
#[derive(Clone)]
pub struct InMemoryDataStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    topologies: DashSet<TopologyId>,
    nodes: NodeCollection,
    changes: broadcast::Sender<DataTreeChange>,
    /// Number of upcoming commits to reject (test hook).
    injected_failures: AtomicUsize,
    commits: AtomicU64,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            inner: Arc::new(StoreInner {
                topologies: DashSet::new(),
                nodes: NodeCollection::new(),
                changes,
                injected_failures: AtomicUsize::new(0),
                commits: AtomicU64::new(0),
            }),
        }
    }

    /// Makes the next `count` commits fail, failing their chains.
    pub fn fail_next_commits(&self, count: usize) {
        self.inner.injected_failures.store(count, Ordering::SeqCst);
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn node(&self, topology: &TopologyId, node_id: &NodeId) -> Option<Arc<OperationalNode>> {
        self.inner.nodes.get(&(topology.clone(), node_id.clone()))
    }

    pub fn has_topology(&self, topology: &TopologyId) -> bool {
        self.inner.topologies.contains(topology)
    }

    pub fn nodes_snapshot(&self) -> Arc<Vec<Arc<OperationalNode>>> {
        self.inner.nodes.snapshot()
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Number of successfully committed batches.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_nodes(&self) -> NodeStream {
        NodeStream::new(self.inner.nodes.subscribe())
    }

    pub fn changes(&self) -> broadcast::Receiver<DataTreeChange> {
        self.inner.changes.subscribe()
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataBroker for InMemoryDataStore {
    fn create_transaction_chain(
        &self,
        listener: Arc<dyn TransactionChainListener>,
    ) -> Arc<dyn TransactionChain> {
        Arc::new(MemoryChain {
            store: Arc::clone(&self.inner),
            listener,
            state: Mutex::new(ChainState::Open),
        })
    }
}

// ── Commit ───────────────────────────────────────────────────────────

impl StoreInner {
    fn commit(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let injected = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::CommitFailed {
                message: "injected commit failure".into(),
            });
        }

        self.validate(batch)?;
        for op in batch.ops() {
            self.apply(op);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Checks every write against the state the batch would see, so a
    /// rejected batch leaves the store untouched.
    fn validate(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut created: HashSet<&TopologyId> = HashSet::new();
        let mut deleted: HashSet<&TopologyId> = HashSet::new();

        for op in batch.ops() {
            match op {
                WriteOp::Merge {
                    path: DataPath::Topology(topology),
                    value: DataValue::EmptyTopology,
                }
                | WriteOp::Put {
                    path: DataPath::Topology(topology),
                    value: DataValue::EmptyTopology,
                } => {
                    created.insert(topology);
                    deleted.remove(topology);
                }
                WriteOp::Delete {
                    path: DataPath::Topology(topology),
                } => {
                    deleted.insert(topology);
                    created.remove(topology);
                }
                WriteOp::Merge {
                    path: path @ DataPath::Node(topology, node_id),
                    value: DataValue::Node(node),
                }
                | WriteOp::Put {
                    path: path @ DataPath::Node(topology, node_id),
                    value: DataValue::Node(node),
                } => {
                    let parent_exists = created.contains(topology)
                        || (!deleted.contains(topology) && self.topologies.contains(topology));
                    if !parent_exists {
                        return Err(StoreError::MissingParent {
                            path: path.to_string(),
                        });
                    }
                    if node.node_id != *node_id {
                        return Err(StoreError::InvalidWrite {
                            path: path.to_string(),
                            reason: format!("node id {} does not match the path", node.node_id),
                        });
                    }
                }
                WriteOp::Delete {
                    path: DataPath::Node(..),
                } => {}
                WriteOp::Merge { path, .. } | WriteOp::Put { path, .. } => {
                    return Err(StoreError::InvalidWrite {
                        path: path.to_string(),
                        reason: "value kind does not match the path".into(),
                    });
                }
            }
        }
        Ok(())
    }

    fn apply(&self, op: &WriteOp) {
        match op {
            WriteOp::Merge {
                path: DataPath::Topology(topology),
                ..
            } => {
                self.topologies.insert(topology.clone());
            }
            WriteOp::Put {
                path: DataPath::Topology(topology),
                ..
            } => {
                self.remove_topology_nodes(topology);
                self.topologies.insert(topology.clone());
            }
            WriteOp::Delete {
                path: DataPath::Topology(topology),
            } => {
                self.remove_topology_nodes(topology);
                self.topologies.remove(topology);
            }
            WriteOp::Merge {
                path: DataPath::Node(topology, node_id),
                value: DataValue::Node(node),
            }
            | WriteOp::Put {
                path: DataPath::Node(topology, node_id),
                value: DataValue::Node(node),
            } => {
                let after = Arc::new(node.as_ref().clone());
                let before = self
                    .nodes
                    .upsert((topology.clone(), node_id.clone()), Arc::clone(&after));
                let change = match before {
                    Some(before) => DataTreeChange::Updated {
                        topology: topology.clone(),
                        before,
                        after,
                    },
                    None => DataTreeChange::Created {
                        topology: topology.clone(),
                        node: after,
                    },
                };
                self.publish(change);
            }
            WriteOp::Delete {
                path: DataPath::Node(topology, node_id),
            } => {
                if let Some(node) = self.nodes.remove(&(topology.clone(), node_id.clone())) {
                    self.publish(DataTreeChange::Removed {
                        topology: topology.clone(),
                        node,
                    });
                }
            }
            // Rejected by `validate`.
            WriteOp::Merge { .. } | WriteOp::Put { .. } => {}
        }
    }

    fn remove_topology_nodes(&self, topology: &TopologyId) {
        for node_id in self.nodes.node_ids(topology) {
            if let Some(node) = self.nodes.remove(&(topology.clone(), node_id)) {
                self.publish(DataTreeChange::Removed {
                    topology: topology.clone(),
                    node,
                });
            }
        }
    }

    fn publish(&self, change: DataTreeChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }
}

// ── Transaction chain ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    Open,
    Failed,
    Closed,
}

struct MemoryChain {
    store: Arc<StoreInner>,
    listener: Arc<dyn TransactionChainListener>,
    /// Held across each commit so batches apply in submission order.
    state: Mutex<ChainState>,
}

impl TransactionChain for MemoryChain {
    fn submit(&self, batch: WriteBatch) -> BoxFuture<'static, Result<(), StoreError>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *state;
        let result = match current {
            ChainState::Failed => Err(StoreError::ChainFailed),
            ChainState::Closed => Err(StoreError::ChainClosed),
            ChainState::Open => match self.store.commit(&batch) {
                Ok(()) => {
                    debug!(ops = batch.ops().len(), "batch committed");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "transaction chain failed");
                    *state = ChainState::Failed;
                    drop(state);
                    self.listener.on_chain_failed(&e);
                    Err(e)
                }
            },
        };
        future::ready(result).boxed()
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ChainState::Open {
            *state = ChainState::Closed;
            drop(state);
            self.listener.on_chain_closed();
        }
    }
}
