use thiserror::Error;

/// Top-level error type for the `ncstack-api` crate.
///
/// Covers every failure mode a NETCONF client implementation can report
/// across the collaborator surface: session setup, RPC invocation,
/// notification registration. `ncstack-core` maps these into domain errors.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// The transport could not establish a session (TCP/SSH/TLS failure,
    /// hello exchange rejected, reconnect attempts exhausted).
    #[error("Cannot connect to {node_id}: {reason}")]
    ConnectFailed { node_id: String, reason: String },

    /// Authentication was rejected by the device.
    #[error("Authentication failed for {node_id}: {message}")]
    Authentication { node_id: String, message: String },

    /// The session went down while an operation was in flight.
    #[error("Session to {node_id} is down")]
    SessionDown { node_id: String },

    /// No session is known for this device.
    #[error("Device {node_id} is not connected")]
    NotConnected { node_id: String },

    // ── RPC ─────────────────────────────────────────────────────────
    /// The device answered with `<rpc-error>` elements.
    #[error("RPC {rpc} failed: {message}")]
    Rpc { rpc: String, message: String },

    /// An operation did not complete in time.
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Notifications ───────────────────────────────────────────────
    /// The listener could not be registered for a notification type.
    #[error("Cannot register notification listener for {path}: {reason}")]
    ListenerRegistration { path: String, reason: String },

    /// A channel to the consumer was closed.
    #[error("Channel closed: {0}")]
    Closed(&'static str),

    // ── Capability ──────────────────────────────────────────────────
    /// Operation not supported by the device or the client implementation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::SessionDown { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the error means the session is gone.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, Self::SessionDown { .. } | Self::NotConnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(
            Error::Timeout { timeout_ms: 10 }.is_transient(),
            "timeouts are retryable"
        );
        assert!(
            !Error::Rpc {
                rpc: "get".into(),
                message: "bad element".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn session_loss_classification() {
        let err = Error::SessionDown {
            node_id: "r1".into(),
        };
        assert!(err.is_session_loss());
        assert_eq!(err.to_string(), "Session to r1 is down");
    }
}
