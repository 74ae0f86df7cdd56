// ── Topology writer ──
//
// Persists operational nodes under `/topology=<id>/node=<id>`. Each device
// gets its own transaction chain so its writes commit in submission order;
// a failed chain is replaced by a fresh one from the broker and the failed
// write is reported to the caller, never retried here.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use ncstack_api::{NodeId, TopologyId};
use tracing::{debug, error, warn};

use crate::error::CoreError;
use crate::model::OperationalNode;
use crate::store::{
    DataBroker, DataPath, DataValue, StoreError, TransactionChain, TransactionChainListener,
    WriteBatch,
};

/// Current chain of one device.
struct ChainSlot {
    chain: Arc<dyn TransactionChain>,
}

/// Cheaply cloneable writer for one topology.
#[derive(Clone)]
pub struct TopologyWriter {
    inner: Arc<WriterInner>,
}

struct WriterInner {
    topology_id: TopologyId,
    broker: Arc<dyn DataBroker>,
    chains: DashMap<NodeId, Arc<ArcSwap<ChainSlot>>>,
}

impl TopologyWriter {
    pub fn new(topology_id: TopologyId, broker: Arc<dyn DataBroker>) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                topology_id,
                broker,
                chains: DashMap::new(),
            }),
        }
    }

    pub fn topology_id(&self) -> &TopologyId {
        &self.inner.topology_id
    }

    /// Writes the first operational state of `id`.
    pub async fn init(&self, id: &NodeId, node: OperationalNode) -> Result<(), CoreError> {
        debug!(node_id = %id, status = %node.connection_status, "init operational node");
        self.put(id, node).await
    }

    /// Replaces the operational state of `id`.
    pub async fn update(&self, id: &NodeId, node: OperationalNode) -> Result<(), CoreError> {
        debug!(node_id = %id, status = %node.connection_status, "update operational node");
        self.put(id, node).await
    }

    /// Removes `id` from the topology and retires its chain.
    pub async fn delete(&self, id: &NodeId) -> Result<(), CoreError> {
        debug!(node_id = %id, "delete operational node");
        let batch = self
            .ensure_parent(WriteBatch::new())
            .delete(self.node_path(id));
        let result = self.submit(id, batch).await;
        if let Some((_, slot)) = self.inner.chains.remove(id) {
            slot.load().chain.close();
        }
        result
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn put(&self, id: &NodeId, node: OperationalNode) -> Result<(), CoreError> {
        let batch = self
            .ensure_parent(WriteBatch::new())
            .put(self.node_path(id), DataValue::Node(Box::new(node)));
        self.submit(id, batch).await
    }

    /// Every batch starts by merging an empty topology container, so node
    /// writes never land under a missing parent.
    fn ensure_parent(&self, batch: WriteBatch) -> WriteBatch {
        batch.merge(
            DataPath::Topology(self.inner.topology_id.clone()),
            DataValue::EmptyTopology,
        )
    }

    fn node_path(&self, id: &NodeId) -> DataPath {
        DataPath::Node(self.inner.topology_id.clone(), id.clone())
    }

    async fn submit(&self, id: &NodeId, batch: WriteBatch) -> Result<(), CoreError> {
        let chain = Arc::clone(&self.chain_for(id).load().chain);
        chain.submit(batch).await.map_err(|e| {
            error!(node_id = %id, error = %e, "operational state commit failed");
            CoreError::illegal_state(format!("commit for node {id} failed: {e}"))
        })
    }

    fn chain_for(&self, id: &NodeId) -> Arc<ArcSwap<ChainSlot>> {
        if let Some(slot) = self.inner.chains.get(id) {
            return Arc::clone(slot.value());
        }
        let slot = self
            .inner
            .chains
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(self.inner.new_chain(id))));
        Arc::clone(slot.value())
    }
}

impl WriterInner {
    fn new_chain(self: &Arc<Self>, id: &NodeId) -> ChainSlot {
        let listener = Arc::new(ChainRecreator {
            writer: Arc::downgrade(self),
            node_id: id.clone(),
        });
        ChainSlot {
            chain: self.broker.create_transaction_chain(listener),
        }
    }
}

/// Swaps in a fresh chain when the current one fails.
struct ChainRecreator {
    writer: Weak<WriterInner>,
    node_id: NodeId,
}

impl TransactionChainListener for ChainRecreator {
    fn on_chain_failed(&self, error: &StoreError) {
        let Some(writer) = self.writer.upgrade() else {
            return;
        };
        warn!(node_id = %self.node_id, error = %error, "transaction chain failed, recreating");
        let slot = writer.chains.get(&self.node_id).map(|s| Arc::clone(s.value()));
        if let Some(slot) = slot {
            slot.store(Arc::new(writer.new_chain(&self.node_id)));
        }
    }
}
