// ── Operational model ──
//
// The externally visible projection of a managed device. Values are built
// fresh on every transition and never mutated in place.

pub mod interner;
pub mod node;
pub mod status;

pub use interner::CapabilityInterner;
pub use node::{AvailableCapabilities, OperationalNode, UnavailableCapabilities};
pub use status::{ClusterStatus, ConnectionStatus, NodeStatus};
