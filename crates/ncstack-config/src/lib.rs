//! Configuration for the ncstack management plane.
//!
//! TOML file plus `NCSTACK_` environment overrides, device credential
//! resolution (env + keyring + plaintext), and translation to
//! `ncstack_core::TopologyConfig` and `ncstack_api::DeviceConfig`.
//! [`init_tracing`] installs the process-wide subscriber.

mod logging;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ncstack_api::{
    CREDENTIALS_REDACTED, Credentials, DeviceConfig, Host, ReconnectConfig, TopologyId,
};
use ncstack_core::TopologyConfig;

pub use logging::{LoggingConfig, init_tracing};

/// Keyring service holding device passwords under `<device>/password`.
const KEYRING_SERVICE: &str = "ncstack";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for device '{device}'")]
    NoCredentials { device: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Look device passwords up in the system keyring.
    #[serde(default = "default_keyring")]
    pub keyring: bool,

    #[serde(default)]
    pub topology: TopologySettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Managed devices by node id.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keyring: default_keyring(),
            topology: TopologySettings::default(),
            logging: LoggingConfig::default(),
            devices: BTreeMap::new(),
        }
    }
}

fn default_keyring() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TopologySettings {
    pub id: String,
    pub replica_id: String,
    pub subscription_timeout_secs: u64,
    pub mount_timeout_secs: u64,
    pub notification_capability_prefix: String,
    pub bus_capacity: usize,
    pub device_channel_size: usize,
    /// Notification namespace prefix -> device stream name.
    pub streams: BTreeMap<String, String>,
}

impl Default for TopologySettings {
    fn default() -> Self {
        let core = TopologyConfig::default();
        Self {
            id: core.topology_id.to_string(),
            replica_id: core.replica_id,
            subscription_timeout_secs: core.subscription_timeout.as_secs(),
            mount_timeout_secs: core.mount_timeout.as_secs(),
            notification_capability_prefix: core.notification_capability_prefix,
            bus_capacity: core.bus_capacity,
            device_channel_size: core.device_channel_size,
            streams: core.stream_map.into_iter().collect(),
        }
    }
}

/// One managed device.
#[derive(Deserialize, Serialize)]
pub struct DeviceEntry {
    /// IP address or host name.
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// The password is already encrypted by the keystore.
    #[serde(default)]
    pub encrypted: bool,

    #[serde(default)]
    pub tcp_only: bool,

    #[serde(default)]
    pub schemaless: bool,

    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

fn default_port() -> u16 {
    830
}
fn default_keepalive() -> u64 {
    120
}

impl fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credentials", &format_args!("{CREDENTIALS_REDACTED}"))
            .field("password_env", &self.password_env)
            .field("encrypted", &self.encrypted)
            .field("tcp_only", &self.tcp_only)
            .field("schemaless", &self.schemaless)
            .field("keepalive_secs", &self.keepalive_secs)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Unset retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: None,
        }
    }
}

fn default_initial_delay() -> u64 {
    2_000
}
fn default_max_delay() -> u64 {
    60_000
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "ncstack", "ncstack").map_or_else(
        || PathBuf::from("ncstack.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if it exists), then `NCSTACK_*` variables.
/// Nested keys are separated by a double underscore, e.g.
/// `NCSTACK_TOPOLOGY__REPLICA_ID`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NCSTACK_").split("__"))
        .extract()?;

    config.validate()?;
    debug!(path = %path.display(), devices = config.devices.len(), "configuration loaded");
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let topology = &self.topology;
        if topology.id.trim().is_empty() {
            return Err(ConfigError::validation("topology.id", "must not be empty"));
        }
        if topology.replica_id.trim().is_empty() {
            return Err(ConfigError::validation("topology.replica_id", "must not be empty"));
        }
        if topology.subscription_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "topology.subscription_timeout_secs",
                "must be positive",
            ));
        }
        if topology.bus_capacity == 0 || topology.device_channel_size == 0 {
            return Err(ConfigError::validation(
                "topology",
                "bus_capacity and device_channel_size must be positive",
            ));
        }

        for (name, device) in &self.devices {
            device.validate(name)?;
        }
        Ok(())
    }

    /// Runtime configuration of the topology manager and event sources.
    pub fn topology_config(&self) -> TopologyConfig {
        let topology = &self.topology;
        TopologyConfig {
            topology_id: TopologyId::new(topology.id.clone()),
            replica_id: topology.replica_id.clone(),
            subscription_timeout: Duration::from_secs(topology.subscription_timeout_secs),
            mount_timeout: Duration::from_secs(topology.mount_timeout_secs),
            notification_capability_prefix: topology.notification_capability_prefix.clone(),
            stream_map: topology
                .streams
                .iter()
                .map(|(prefix, stream)| (prefix.clone(), stream.clone()))
                .collect::<IndexMap<_, _>>(),
            bus_capacity: topology.bus_capacity,
            device_channel_size: topology.device_channel_size,
        }
    }

    /// Every configured device with its credentials resolved.
    pub fn device_configs(&self) -> Result<Vec<DeviceConfig>, ConfigError> {
        self.devices
            .iter()
            .map(|(name, device)| device.to_device_config(name, self.keyring))
            .collect()
    }
}

impl DeviceEntry {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation(
                format!("devices.{name}.host"),
                "must not be empty",
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::validation(format!("devices.{name}.port"), "must not be 0"));
        }
        if self.username.is_none() && (self.password.is_some() || self.password_env.is_some()) {
            return Err(ConfigError::validation(
                format!("devices.{name}.username"),
                "required when a password is configured",
            ));
        }
        Ok(())
    }

    pub fn to_device_config(&self, name: &str, use_keyring: bool) -> Result<DeviceConfig, ConfigError> {
        self.validate(name)?;
        let Ok(host) = self.host.parse::<Host>();

        let mut config = DeviceConfig::new(name, host, self.port);
        config.tcp_only = self.tcp_only;
        config.schemaless = self.schemaless;
        config.keepalive = Duration::from_secs(self.keepalive_secs);
        config.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
        };
        config.credentials = resolve_credentials(self, name, use_keyring)?;
        Ok(config)
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a device password: `password_env` variable, then the system
/// keyring (when enabled), then plaintext in the config.
pub fn resolve_password(
    device: &DeviceEntry,
    name: &str,
    use_keyring: bool,
) -> Result<SecretString, ConfigError> {
    // 1. Env var named by the device entry
    if let Some(ref env_name) = device.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if use_keyring {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{name}/password")) {
            if let Ok(secret) = entry.get_password() {
                return Ok(SecretString::from(secret));
            }
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = device.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials { device: name.into() })
}

/// `None` for devices without a username (no authentication configured).
pub fn resolve_credentials(
    device: &DeviceEntry,
    name: &str,
    use_keyring: bool,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = device.username.clone() else {
        return Ok(None);
    };
    let password = resolve_password(device, name, use_keyring)?;

    Ok(Some(if device.encrypted {
        Credentials::LoginPasswordEncrypted {
            username,
            encrypted_password: password,
        }
    } else {
        Credentials::LoginPassword { username, password }
    }))
}
