// ── Reactive node collection ──
//
// Concurrent storage with O(1) lookups and push-based change notification
// via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use ncstack_api::{NodeId, TopologyId};
use tokio::sync::watch;

use crate::model::OperationalNode;

pub(crate) type NodeKey = (TopologyId, NodeId);
pub(crate) type Snapshot = Arc<Vec<Arc<OperationalNode>>>;

/// Operational nodes of every topology in one store.
///
/// Every mutation rebuilds the snapshot that subscribers receive.
pub(crate) struct NodeCollection {
    by_key: DashMap<NodeKey, Arc<OperationalNode>>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Snapshot>,
}

impl NodeCollection {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace a node. Returns the previous value, if any.
    pub(crate) fn upsert(&self, key: NodeKey, node: Arc<OperationalNode>) -> Option<Arc<OperationalNode>> {
        let previous = self.by_key.insert(key, node);
        self.rebuild_snapshot();
        previous
    }

    pub(crate) fn remove(&self, key: &NodeKey) -> Option<Arc<OperationalNode>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, key: &NodeKey) -> Option<Arc<OperationalNode>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Ids of the nodes stored under `topology`.
    pub(crate) fn node_ids(&self, topology: &TopologyId) -> Vec<NodeId> {
        self.by_key
            .iter()
            .filter(|r| r.key().0 == *topology)
            .map(|r| r.key().1.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<OperationalNode>> =
            self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ncstack_api::Host;

    use super::*;
    use crate::model::ConnectionStatus;

    fn key(node: &str) -> NodeKey {
        (TopologyId::new("topology-netconf"), NodeId::new(node))
    }

    fn node(id: &str, status: ConnectionStatus) -> Arc<OperationalNode> {
        Arc::new(OperationalNode::new(
            NodeId::new(id),
            status,
            Host::Domain(format!("{id}.lab")),
            830,
        ))
    }

    #[test]
    fn upsert_returns_previous_value() {
        let col = NodeCollection::new();
        assert!(col.upsert(key("r1"), node("r1", ConnectionStatus::Connecting)).is_none());
        let previous = col.upsert(key("r1"), node("r1", ConnectionStatus::Connected));
        assert_eq!(previous.unwrap().connection_status, ConnectionStatus::Connecting);
        assert_eq!(col.get(&key("r1")).unwrap().connection_status, ConnectionStatus::Connected);
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_and_tracks_removal() {
        let col = NodeCollection::new();
        col.upsert(key("r2"), node("r2", ConnectionStatus::Connecting));
        col.upsert(key("r1"), node("r1", ConnectionStatus::Connecting));

        let ids: Vec<_> = col.snapshot().iter().map(|n| n.node_id.to_string()).collect();
        assert_eq!(ids, ["r1", "r2"]);

        assert!(col.remove(&key("r1")).is_some());
        assert!(col.remove(&key("r1")).is_none());
        assert_eq!(col.len(), 1);
        assert_eq!(col.snapshot().len(), 1);
    }
}
