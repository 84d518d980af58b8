//! Runtime settings for discovery, control and the registry.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};

use crate::errors::Error;
use crate::net::CONTROL_PORT;

/// Default registry database location.
pub const DEFAULT_DB_PATH: &str = "./govee_registry.sqlite";

/// Settings for a discovery run.
#[serde_as]
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Local interface to bind and join on. `None` means all interfaces.
    pub bind_ip: Option<Ipv4Addr>,
    /// Number of scan requests sent per run (at least one is always sent).
    pub scan_repeat: u32,
    /// Pause between scan requests.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub scan_interval: Duration,
    /// Look up each responder's MAC in the neighbor table.
    pub resolve_mac: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            bind_ip: None,
            scan_repeat: 3,
            scan_interval: Duration::from_secs(1),
            resolve_mac: false,
        }
    }
}

/// Settings for unicast control and status exchanges.
#[serde_as]
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Local interface to send from.
    pub bind_ip: Option<Ipv4Addr>,
    /// Fixed local port for replies; ephemeral when `None`.
    pub reply_port: Option<u16>,
    /// Receive timeout for a single exchange.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub timeout: Duration,
    /// Device-side port commands are sent to.
    pub device_port: u16,
    /// Scope `devStatus` requests with the device id and SKU.
    pub scope_status_requests: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            bind_ip: None,
            reply_port: None,
            timeout: Duration::from_secs(2),
            device_port: CONTROL_PORT,
            scope_status_requests: false,
        }
    }
}

/// Top-level settings, loadable from a JSON file.
///
/// Every field has a default, so a file only needs the values it changes:
///
/// ```
/// use govee_lan_rs::Settings;
///
/// let settings: Settings = serde_json::from_str(
///     r#"{"db_path": "/tmp/lan.sqlite", "control": {"timeout": 0.5}}"#,
/// ).unwrap();
/// assert_eq!(settings.control.timeout.as_millis(), 500);
/// assert_eq!(settings.discovery.scan_repeat, 3);
/// ```
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Local interface for every socket, unless a section sets its own.
    pub bind_ip: Option<Ipv4Addr>,
    pub discovery: DiscoveryConfig,
    pub control: ControlConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_ip: None,
            discovery: DiscoveryConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Discovery settings with the shared bind address filled in.
    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            bind_ip: self.discovery.bind_ip.or(self.bind_ip),
            ..self.discovery.clone()
        }
    }

    /// Control settings with the shared bind address filled in.
    pub fn control(&self) -> ControlConfig {
        ControlConfig {
            bind_ip: self.control.bind_ip.or(self.bind_ip),
            ..self.control.clone()
        }
    }
}
