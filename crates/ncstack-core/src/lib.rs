//! Management plane core for NETCONF-managed devices.
//!
//! This crate owns device lifecycle, clustered operational state and
//! notification fan-out. The NETCONF client itself sits behind the traits
//! of `ncstack-api`:
//!
//! - **[`TopologyManager`]**: entry point for configuration changes. Runs one
//!   [`DeviceHandle`] actor per device, fans lifecycle operations out to
//!   peer [`Replica`]s when master, combines their answers through the
//!   [`OperationalStateAggregator`] and persists the result with the
//!   [`TopologyWriter`].
//!
//! - **[`InMemoryDataStore`]**: reactive operational store reached only
//!   through the [`DataBroker`] / [`TransactionChain`] traits, with a
//!   change feed of [`DataTreeChange`]s.
//!
//! - **[`EventSourceManager`]**: follows that feed and keeps one
//!   [`NetconfEventSource`] per notification-capable device. Topics joined
//!   on a source are delivered on the [`TopicBus`].
//!
//! - **[`SubtreeFilter`]**: immutable RFC 6241 subtree filter AST, read
//!   from `<filter>` XML and evaluated locally against data trees.

pub mod aggregator;
pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod event_source;
pub mod filter;
pub mod model;
pub mod store;
pub mod topic;
pub mod topology;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregator::OperationalStateAggregator;
pub use bus::{TopicBus, TopicId, TopicNotification};
pub use config::TopologyConfig;
pub use device::{
    ClusterServices, DeviceHandle, MountPoint, MountPointRegistrar, MountPointRegistry, RoleChange,
    RoleElection, SingleNodeElection,
};
pub use error::CoreError;
pub use event_source::{EventSourceManager, EventSourceRegistry, JoinTopicStatus, NetconfEventSource};
pub use filter::SubtreeFilter;
pub use model::{
    CapabilityInterner, ClusterStatus, ConnectionStatus, NodeStatus, OperationalNode,
};
pub use store::{
    DataBroker, DataPath, DataTreeChange, DataValue, InMemoryDataStore, StoreError,
    TransactionChain, TransactionChainListener, WriteBatch, WriteOp,
};
pub use topic::{NotificationSourceType, NotificationTopicRegistration};
pub use topology::{Replica, TopologyManager};
pub use writer::TopologyWriter;
