// ── Runtime topology configuration ──
//
// Tuning for one topology manager instance. Built by the config crate
// (or directly by embedders and tests) and handed in; core never reads
// config files.

use std::time::Duration;

use indexmap::IndexMap;
use ncstack_api::{NOTIFICATION_CAPABILITY_PREFIX, TopologyId};

/// Configuration for one topology manager and its event sources.
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// Topology the managed nodes live in (e.g. `topology-netconf`).
    pub topology_id: TopologyId,
    /// Name of this cluster member, recorded in each node's status list.
    pub replica_id: String,
    /// Upper bound on a `create-subscription` round trip. An RPC that has
    /// not answered by then is dropped and the stream stays inactive.
    pub subscription_timeout: Duration,
    /// How long the event-source manager waits for a connected device's
    /// mount point to appear.
    pub mount_timeout: Duration,
    /// Capability prefix a device must advertise to become an event source.
    pub notification_capability_prefix: String,
    /// Notification namespace prefix -> device stream name.
    pub stream_map: IndexMap<String, String>,
    /// Capacity of the topic bus broadcast channel.
    pub bus_capacity: usize,
    /// Depth of each device actor's mailbox.
    pub device_channel_size: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let mut stream_map = IndexMap::new();
        stream_map.insert(
            "urn:ietf:params:xml:ns:netconf:notification".to_owned(),
            "NETCONF".to_owned(),
        );

        Self {
            topology_id: TopologyId::new("topology-netconf"),
            replica_id: "member-1".into(),
            subscription_timeout: Duration::from_secs(10),
            mount_timeout: Duration::from_secs(5),
            notification_capability_prefix: NOTIFICATION_CAPABILITY_PREFIX.into(),
            stream_map,
            bus_capacity: 256,
            device_channel_size: 64,
        }
    }
}
