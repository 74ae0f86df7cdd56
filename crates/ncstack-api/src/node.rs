// ── Device identity and connection configuration ──
//
// These types describe *which* device to talk to and *how* to reach it.
// They carry credential data, so their `Debug` output is always redacted.
// Config loaders construct a `DeviceConfig` and hand it to the core.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Marker rendered in place of any credential material.
pub const CREDENTIALS_REDACTED: &str = "[credentials redacted]";

// ── NodeId / TopologyId ──────────────────────────────────────────────

/// Identifier of a device node, unique within its topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a topology (e.g. `"topology-netconf"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopologyId(String);

impl TopologyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopologyId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── Host ─────────────────────────────────────────────────────────────

/// Transport address of a device: a literal IP or a domain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Host {
    Ip(IpAddr),
    Domain(String),
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{ip}"),
            Self::Domain(name) => f.write_str(name),
        }
    }
}

impl FromStr for Host {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<IpAddr>()
            .map_or_else(|_| Self::Domain(s.to_owned()), Self::Ip))
    }
}

impl From<IpAddr> for Host {
    fn from(ip: IpAddr) -> Self {
        Self::Ip(ip)
    }
}

// ── Credentials ──────────────────────────────────────────────────────

/// Login material for a device session.
///
/// `Debug` never prints the username or the password, whichever variant
/// is in use.
#[derive(Clone)]
pub enum Credentials {
    /// Plain username + password.
    LoginPassword {
        username: String,
        password: SecretString,
    },
    /// Username + password already encrypted by the keystore; the transport
    /// decrypts it right before authenticating.
    LoginPasswordEncrypted {
        username: String,
        encrypted_password: SecretString,
    },
}

impl Credentials {
    pub fn username(&self) -> &str {
        match self {
            Self::LoginPassword { username, .. } | Self::LoginPasswordEncrypted { username, .. } => {
                username
            }
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::LoginPasswordEncrypted { .. })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(CREDENTIALS_REDACTED)
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration used by the transport between
/// connection attempts. The core never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 2s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Maximum connection attempts before reporting the device as failed.
    /// `None` means retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait before attempt number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

// ── DeviceConfig ─────────────────────────────────────────────────────

/// Configured (intended) state of one managed device.
///
/// Immutable once a connection attempt starts: a changed configuration is
/// applied by disconnecting and reconnecting under the new value.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub node_id: NodeId,
    pub host: Host,
    pub port: u16,
    pub credentials: Option<Credentials>,
    /// Plain TCP instead of SSH.
    pub tcp_only: bool,
    /// Skip schema download; operate on base NETCONF only.
    pub schemaless: bool,
    /// Keepalive interval; zero disables keepalives.
    pub keepalive: Duration,
    pub reconnect: ReconnectConfig,
}

impl DeviceConfig {
    pub fn new(node_id: impl Into<NodeId>, host: Host, port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            host,
            port,
            credentials: None,
            tcp_only: false,
            schemaless: false,
            keepalive: Duration::from_secs(120),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// `host:port` rendering used in log fields.
    pub fn address(&self) -> String {
        match &self.host {
            Host::Ip(IpAddr::V6(ip)) => format!("[{ip}]:{}", self.port),
            host => format!("{host}:{}", self.port),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
