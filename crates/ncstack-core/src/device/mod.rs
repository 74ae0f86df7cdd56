// ── Device connection state machine ──
//
// `Connecting -> {Connected, UnableToConnect}`, `Connected -> Connecting`
// on session loss, back to `Connecting` on every retry or reconfiguration.
// The actor reacts only to the transport's terminal callbacks; reconnect
// policy belongs to the transport.

mod actor;
pub mod cluster;
pub mod handler;

pub use actor::{DeviceContext, DeviceHandle, DeviceMessage};
pub use cluster::{
    ClusterServices, MountPoint, MountPointRegistrar, MountPointRegistry, RoleChange,
    RoleElection, SingleNodeElection,
};
pub use handler::UNKNOWN_REASON;
