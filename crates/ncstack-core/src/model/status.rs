// ── Connection and cluster status ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Connection status of a device as seen by one replica.
///
/// Only the device state machine moves a device between these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    UnableToConnect,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Per-replica view recorded in a node's clustered status list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ClusterStatus {
    Connected,
    Unavailable,
    Failed,
}

/// `(replica, status)` entry of the clustered status list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeStatus {
    pub replica: String,
    pub status: ClusterStatus,
}

impl NodeStatus {
    pub fn new(replica: impl Into<String>, status: ClusterStatus) -> Self {
        Self {
            replica: replica.into(),
            status,
        }
    }
}
