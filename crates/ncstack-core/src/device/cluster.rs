// ── Cluster collaborators ──
//
// Mount points and role election are the only parts of a clustered
// deployment the device actor needs. A standalone deployment uses the
// bundled `MountPointRegistry` and `SingleNodeElection`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ncstack_api::{DeviceServices, NodeId, SchemaContext};
use tokio::sync::{Notify, mpsc};
use tracing::debug;

// ── Mount points ─────────────────────────────────────────────────────

/// A connected device's services, exposed under its node id.
#[derive(Debug, Clone)]
pub struct MountPoint {
    pub node_id: NodeId,
    pub schema: SchemaContext,
    pub services: DeviceServices,
}

pub trait MountPointRegistrar: Send + Sync {
    /// Registers (or replaces) the mount point of `mount.node_id`.
    fn register(&self, mount: MountPoint);

    /// Removes the mount point of `node_id`, if any.
    fn unregister(&self, node_id: &NodeId);
}

/// Concurrent in-process mount point registry.
#[derive(Debug, Default)]
pub struct MountPointRegistry {
    mounts: DashMap<NodeId, Arc<MountPoint>>,
    registered: Notify,
}

impl MountPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Arc<MountPoint>> {
        self.mounts.get(node_id).map(|m| Arc::clone(m.value()))
    }

    /// Waits up to `timeout` for `node_id` to be mounted.
    pub async fn wait_for(&self, node_id: &NodeId, timeout: Duration) -> Option<Arc<MountPoint>> {
        let mounted = async {
            loop {
                // Created before the lookup so a registration in between
                // still wakes us.
                let notified = self.registered.notified();
                if let Some(mount) = self.get(node_id) {
                    return mount;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, mounted).await.ok()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.mounts.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

impl MountPointRegistrar for MountPointRegistry {
    fn register(&self, mount: MountPoint) {
        debug!(node_id = %mount.node_id, "mount point registered");
        self.mounts.insert(mount.node_id.clone(), Arc::new(mount));
        self.registered.notify_waiters();
    }

    fn unregister(&self, node_id: &NodeId) {
        if self.mounts.remove(node_id).is_some() {
            debug!(node_id = %node_id, "mount point unregistered");
        }
    }
}

// ── Role election ────────────────────────────────────────────────────

/// Ownership change of one device on this replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChange {
    pub was_owner: bool,
    pub is_owner: bool,
}

impl RoleChange {
    pub fn is_unchanged(self) -> bool {
        self.was_owner == self.is_owner
    }
}

/// Decides which connected replica owns (masters) a device.
pub trait RoleElection: Send + Sync {
    /// Enters `node_id` into the election; ownership changes are delivered
    /// to `sink` until the candidate is unregistered.
    fn register_candidate(&self, node_id: &NodeId, sink: mpsc::UnboundedSender<RoleChange>);

    fn unregister_candidate(&self, node_id: &NodeId);
}

/// Election with a single participant: every candidate is granted
/// ownership as soon as it registers.
#[derive(Debug, Default)]
pub struct SingleNodeElection {
    owned: DashMap<NodeId, ()>,
}

impl SingleNodeElection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_owner(&self, node_id: &NodeId) -> bool {
        self.owned.contains_key(node_id)
    }
}

impl RoleElection for SingleNodeElection {
    fn register_candidate(&self, node_id: &NodeId, sink: mpsc::UnboundedSender<RoleChange>) {
        let was_owner = self.owned.insert(node_id.clone(), ()).is_some();
        // The candidate may already be gone; nothing to tell it then.
        let _ = sink.send(RoleChange {
            was_owner,
            is_owner: true,
        });
    }

    fn unregister_candidate(&self, node_id: &NodeId) {
        self.owned.remove(node_id);
    }
}

/// Collaborators a device actor needs from the deployment.
#[derive(Clone)]
pub struct ClusterServices {
    pub mount_points: Arc<dyn MountPointRegistrar>,
    pub election: Arc<dyn RoleElection>,
}

impl ClusterServices {
    /// Single-replica deployment: mounts go to `mount_points` and every
    /// connected device is owned locally.
    pub fn standalone(mount_points: Arc<MountPointRegistry>) -> Self {
        Self {
            mount_points,
            election: Arc::new(SingleNodeElection::new()),
        }
    }
}
