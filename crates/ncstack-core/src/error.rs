// ── Core error types ──
//
// Domain errors from ncstack-core. Transport-level failures arrive as
// `ncstack_api::Error` and are translated by the `From` impl below, so
// callers never match on collaborator internals.

use thiserror::Error;

use crate::store::StoreError;

/// Unified error type for the core crate.
///
/// `Clone` so a single cause can be handed to every waiter of a combined
/// operation (aggregation fan-in, queued device requests).
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Validation errors ────────────────────────────────────────────
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device not found: {node_id}")]
    DeviceNotFound { node_id: String },

    #[error("Handler for device {node_id} has stopped")]
    HandlerClosed { node_id: String },

    // ── Collaborator errors (wrapped, not exposed raw) ───────────────
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// Whether retrying later may succeed.
        transient: bool,
    },

    #[error("Data store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { transient: true, .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ncstack_api::Error> for CoreError {
    fn from(err: ncstack_api::Error) -> Self {
        match err {
            ncstack_api::Error::UnsupportedOperation(op) => CoreError::Unsupported {
                operation: op.to_string(),
            },
            ncstack_api::Error::NotConnected { node_id } => CoreError::DeviceNotFound { node_id },
            other => CoreError::Transport {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_keep_transience() {
        let err = CoreError::from(ncstack_api::Error::Timeout { timeout_ms: 250 });
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Transport error: Operation timed out after 250ms");

        let err = CoreError::from(ncstack_api::Error::Rpc {
            rpc: "create-subscription".into(),
            message: "stream unknown".into(),
        });
        assert!(!err.is_transient());
    }

    #[test]
    fn unsupported_maps_to_domain_variant() {
        let err = CoreError::from(ncstack_api::Error::UnsupportedOperation("replay"));
        assert!(matches!(err, CoreError::Unsupported { ref operation } if operation == "replay"));
    }
}
