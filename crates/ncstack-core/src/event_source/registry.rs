// ── Event source registry ──

use std::sync::Arc;

use dashmap::DashMap;
use ncstack_api::NodeId;
use tracing::debug;

use super::source::NetconfEventSource;

/// Live event sources keyed by device. Cheaply cloneable; clones share the
/// same map.
#[derive(Clone, Default)]
pub struct EventSourceRegistry {
    sources: Arc<DashMap<NodeId, Arc<NetconfEventSource>>>,
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source`, returning the one it replaced.
    pub fn register(&self, source: Arc<NetconfEventSource>) -> Option<Arc<NetconfEventSource>> {
        debug!(node_id = %source.node_id(), "event source registered");
        self.sources.insert(source.node_id().clone(), source)
    }

    pub fn unregister(&self, node_id: &NodeId) -> Option<Arc<NetconfEventSource>> {
        self.sources.remove(node_id).map(|(_, source)| source)
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Arc<NetconfEventSource>> {
        self.sources.get(node_id).map(|s| Arc::clone(s.value()))
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.sources.contains_key(node_id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.sources.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Unregisters and closes every source.
    pub async fn close_all(&self) {
        // Collect first: no map guard may be held across an await.
        let sources: Vec<_> = self
            .node_ids()
            .iter()
            .filter_map(|id| self.unregister(id))
            .collect();
        for source in sources {
            source.close().await;
        }
    }
}
