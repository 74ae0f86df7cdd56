// ── Operational node ──

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use ncstack_api::{FailureReason, Host, NodeId};
use serde::{Deserialize, Serialize};

use super::status::{ConnectionStatus, NodeStatus};

/// Resolved capability URIs, in advertisement order, without duplicates.
pub type AvailableCapabilities = IndexSet<Arc<str>>;

/// Unusable capability URIs and the reason each one failed.
pub type UnavailableCapabilities = IndexMap<Arc<str>, FailureReason>;

/// Externally visible state of one device, as persisted in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalNode {
    pub node_id: NodeId,
    pub connection_status: ConnectionStatus,
    pub host: Host,
    pub port: u16,
    pub available_capabilities: AvailableCapabilities,
    pub unavailable_capabilities: UnavailableCapabilities,
    /// One entry per replica that attempted the device.
    pub cluster_status: Vec<NodeStatus>,
    /// Human-readable failure reason, set for `UnableToConnect`.
    pub connected_message: Option<String>,
}

impl OperationalNode {
    /// Node without capabilities or status entries.
    pub fn new(node_id: NodeId, connection_status: ConnectionStatus, host: Host, port: u16) -> Self {
        Self {
            node_id,
            connection_status,
            host,
            port,
            available_capabilities: AvailableCapabilities::default(),
            unavailable_capabilities: UnavailableCapabilities::default(),
            cluster_status: Vec::new(),
            connected_message: None,
        }
    }

    pub fn with_cluster_status(mut self, cluster_status: Vec<NodeStatus>) -> Self {
        self.cluster_status = cluster_status;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.connected_message = Some(message.into());
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status.is_connected()
    }

    /// `true` if any available capability starts with `prefix`.
    pub fn advertises(&self, prefix: &str) -> bool {
        self.available_capabilities
            .iter()
            .any(|c| c.starts_with(prefix))
    }
}
