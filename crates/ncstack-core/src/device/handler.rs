// ── Operational projections ──
//
// Pure functions building the operational node a device actor publishes
// for each state. Every projection carries exactly one cluster status
// entry: this replica's.

use ncstack_api::{DeviceCapabilities, DeviceConfig};

use crate::model::{
    AvailableCapabilities, CapabilityInterner, ClusterStatus, ConnectionStatus, NodeStatus,
    OperationalNode, UnavailableCapabilities,
};

/// Message recorded when a device fails without a reported cause.
pub const UNKNOWN_REASON: &str = "Unknown reason";

fn base(config: &DeviceConfig, status: ConnectionStatus, replica: &str, cluster: ClusterStatus) -> OperationalNode {
    OperationalNode::new(config.node_id.clone(), status, config.host.clone(), config.port)
        .with_cluster_status(vec![NodeStatus::new(replica, cluster)])
}

/// `Connecting`, with this replica unavailable. Published when a connect
/// attempt starts.
pub fn initial_state(config: &DeviceConfig, replica: &str) -> OperationalNode {
    base(config, ConnectionStatus::Connecting, replica, ClusterStatus::Unavailable)
}

/// `UnableToConnect`, with this replica failed. Written when combining
/// replica results fails.
pub fn failed_state(config: &DeviceConfig, replica: &str) -> OperationalNode {
    base(config, ConnectionStatus::UnableToConnect, replica, ClusterStatus::Failed)
}

/// `Connected`, with the negotiated capability sets.
pub fn connected_state(
    config: &DeviceConfig,
    replica: &str,
    capabilities: &DeviceCapabilities,
    interner: &CapabilityInterner,
) -> OperationalNode {
    let mut node = base(config, ConnectionStatus::Connected, replica, ClusterStatus::Connected);
    let (available, unavailable) = project_capabilities(capabilities, interner);
    node.available_capabilities = available;
    node.unavailable_capabilities = unavailable;
    node
}

/// `Connecting` after a session loss; capabilities are cleared.
pub fn disconnected_state(config: &DeviceConfig, replica: &str) -> OperationalNode {
    initial_state(config, replica)
}

/// `UnableToConnect` after the transport gave up, with a readable reason.
pub fn unable_to_connect_state(config: &DeviceConfig, replica: &str, cause: Option<&str>) -> OperationalNode {
    failed_state(config, replica).with_message(cause.unwrap_or(UNKNOWN_REASON))
}

/// Available = non-module capabilities followed by resolved module
/// capabilities; unavailable = each unresolved capability with its reason.
pub fn project_capabilities(
    capabilities: &DeviceCapabilities,
    interner: &CapabilityInterner,
) -> (AvailableCapabilities, UnavailableCapabilities) {
    let available = capabilities
        .non_module
        .iter()
        .chain(&capabilities.resolved)
        .map(|uri| interner.intern(uri))
        .collect();
    let unavailable = capabilities
        .unresolved
        .iter()
        .map(|(uri, reason)| (interner.intern(uri), *reason))
        .collect();
    (available, unavailable)
}
