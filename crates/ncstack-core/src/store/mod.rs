// ── Operational data store ──
//
// The store itself is a collaborator: writers see it only through the
// `DataBroker` / `TransactionChain` traits. `InMemoryDataStore` is the
// bundled implementation, with reactive snapshots and a change feed.

mod collection;
mod memory;
mod stream;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use ncstack_api::{NodeId, TopologyId};
use thiserror::Error;

use crate::model::OperationalNode;

pub use memory::{DataTreeChange, InMemoryDataStore};
pub use stream::NodeStream;

// ── Paths and writes ─────────────────────────────────────────────────

/// Location of a value in the operational store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataPath {
    /// The topology container holding every node list entry.
    Topology(TopologyId),
    /// One node inside a topology.
    Node(TopologyId, NodeId),
}

impl DataPath {
    pub fn topology_id(&self) -> &TopologyId {
        match self {
            Self::Topology(topology) | Self::Node(topology, _) => topology,
        }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology(topology) => write!(f, "/topology={topology}"),
            Self::Node(topology, node) => write!(f, "/topology={topology}/node={node}"),
        }
    }
}

/// Value written at a [`DataPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataValue {
    /// Empty topology container, used to make sure the parent exists.
    EmptyTopology,
    Node(Box<OperationalNode>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Combine with whatever is stored (creating it if missing).
    Merge { path: DataPath, value: DataValue },
    /// Replace whatever is stored.
    Put { path: DataPath, value: DataValue },
    Delete { path: DataPath },
}

impl WriteOp {
    pub fn path(&self) -> &DataPath {
        match self {
            Self::Merge { path, .. } | Self::Put { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Ordered group of writes committed as one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(mut self, path: DataPath, value: DataValue) -> Self {
        self.ops.push(WriteOp::Merge { path, value });
        self
    }

    pub fn put(mut self, path: DataPath, value: DataValue) -> Self {
        self.ops.push(WriteOp::Put { path, value });
        self
    }

    pub fn delete(mut self, path: DataPath) -> Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Commit failed: {message}")]
    CommitFailed { message: String },

    #[error("Transaction chain has failed; create a new chain")]
    ChainFailed,

    #[error("Transaction chain is closed")]
    ChainClosed,

    #[error("Parent of {path} does not exist")]
    MissingParent { path: String },

    #[error("Invalid write at {path}: {reason}")]
    InvalidWrite { path: String, reason: String },
}

// ── Broker traits ────────────────────────────────────────────────────

/// Receives the terminal outcome of a transaction chain.
pub trait TransactionChainListener: Send + Sync {
    /// The chain failed on `error`; it accepts no further batches.
    fn on_chain_failed(&self, error: &StoreError);

    fn on_chain_closed(&self) {}
}

/// Sequence of transactions committed in submission order.
pub trait TransactionChain: Send + Sync {
    /// Submits `batch`; the future resolves once it is committed.
    fn submit(&self, batch: WriteBatch) -> BoxFuture<'static, Result<(), StoreError>>;

    fn close(&self);
}

pub trait DataBroker: Send + Sync {
    fn create_transaction_chain(
        &self,
        listener: Arc<dyn TransactionChainListener>,
    ) -> Arc<dyn TransactionChain>;
}
