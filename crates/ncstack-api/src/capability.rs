// ── Capability exchange results ──
//
// What the transport learned about a device during the hello exchange
// and schema resolution. The core projects these into the available /
// unavailable capability sets of the operational node.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// URI prefix of the RFC 5277 notification capability. Devices that do not
/// advertise it cannot act as event sources.
pub const NOTIFICATION_CAPABILITY_PREFIX: &str = "urn:ietf:params:netconf:capability:notification";

/// Why a module capability advertised by the device could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// No schema source could provide the module.
    MissingSource,
    /// The module was found but failed to resolve (imports, syntax).
    UnableToResolve,
    /// The module uses constructs the client cannot handle.
    NotSupportedByTool,
}

/// Result of capability negotiation for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Capabilities that are not YANG modules (`:candidate`, `:notification`, ...).
    pub non_module: Vec<String>,
    /// Module capabilities whose schemas were resolved.
    pub resolved: Vec<String>,
    /// Module capabilities that could not be resolved, with the reason.
    pub unresolved: Vec<(String, FailureReason)>,
}

impl DeviceCapabilities {
    /// `true` if any advertised capability starts with `prefix`.
    pub fn advertises(&self, prefix: &str) -> bool {
        self.non_module
            .iter()
            .chain(&self.resolved)
            .any(|c| c.starts_with(prefix))
    }
}

/// Session-level preferences negotiated with the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPreferences {
    pub session_id: Option<u32>,
    pub capabilities: DeviceCapabilities,
}

impl SessionPreferences {
    pub fn is_notifications_supported(&self) -> bool {
        self.capabilities.advertises(NOTIFICATION_CAPABILITY_PREFIX)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_round_trips_kebab_case() {
        assert_eq!(FailureReason::UnableToResolve.to_string(), "unable-to-resolve");
        assert_eq!(
            "missing-source".parse::<FailureReason>().unwrap(),
            FailureReason::MissingSource
        );
    }

    #[test]
    fn notification_support_is_detected_from_capabilities() {
        let prefs = SessionPreferences {
            session_id: Some(7),
            capabilities: DeviceCapabilities {
                non_module: vec!["urn:ietf:params:netconf:capability:notification:1.0".into()],
                ..DeviceCapabilities::default()
            },
        };
        assert!(prefs.is_notifications_supported());
        assert!(!SessionPreferences::default().is_notifications_supported());
    }
}
