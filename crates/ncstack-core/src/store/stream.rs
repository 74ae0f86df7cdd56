// ── Node subscriptions ──
//
// Watch-backed views over the operational nodes held by the in-memory
// store. Each view keeps the last snapshot it observed.

use std::sync::Arc;

use ncstack_api::NodeId;
use tokio::sync::watch;

use super::collection::Snapshot;
use crate::model::OperationalNode;

/// Subscription to every operational node of a store.
///
/// Poll with [`changed`](Self::changed).
pub struct NodeStream {
    observed: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl NodeStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let observed = receiver.borrow().clone();
        Self { observed, receiver }
    }

    /// Nodes as of subscription or the last [`changed`](Self::changed).
    pub fn current(&self) -> &Snapshot {
        &self.observed
    }

    /// Looks `node_id` up in the observed snapshot.
    pub fn find(&self, node_id: &NodeId) -> Option<&Arc<OperationalNode>> {
        self.observed.iter().find(|node| &node.node_id == node_id)
    }

    /// Waits for the next commit that touched a node. `None` once the store
    /// is gone.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        self.observed = self.receiver.borrow_and_update().clone();
        Some(Arc::clone(&self.observed))
    }
}
