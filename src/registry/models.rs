use std::net::{Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source address of a received datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint {
            ip: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

/// One received multicast datagram, stored whether or not it parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub received_at_ms: i64,
    pub src: Endpoint,
    /// Datagram text, lossily decoded.
    pub payload_raw: String,
}

impl ScanEvent {
    pub fn new(received_at_ms: i64, src: SocketAddr, bytes: &[u8]) -> Self {
        ScanEvent {
            received_at_ms,
            src: src.into(),
            payload_raw: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// What one scan response says about a device.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanObservation {
    pub device_id: String,
    pub ip: Option<String>,
    pub sku: Option<String>,
    pub ble_version_hard: Option<String>,
    pub ble_version_soft: Option<String>,
    pub wifi_version_hard: Option<String>,
    pub wifi_version_soft: Option<String>,
    pub mac: Option<String>,
    /// Compact JSON of the whole envelope.
    pub scan_payload: String,
    pub seen_ms: i64,
}

/// Latest known state of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub ip: Option<String>,
    pub sku: Option<String>,
    pub ble_version_hard: Option<String>,
    pub ble_version_soft: Option<String>,
    pub wifi_version_hard: Option<String>,
    pub wifi_version_soft: Option<String>,
    pub mac: Option<String>,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub last_scan_payload: Option<Value>,
    pub last_status_payload: Option<Value>,
    pub extra: Value,
}

/// One control or status attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrogation {
    pub device_id: Option<String>,
    pub ip: String,
    pub cmd: String,
    pub sent_at_ms: i64,
    pub received_at_ms: Option<i64>,
    pub success: bool,
    /// Classification such as `timeout` or `invalid_json`.
    pub error: Option<String>,
    pub request: Value,
    pub response: Option<Value>,
}

/// A normalized per-device attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub device_id: String,
    pub key: String,
    pub value: Value,
    pub updated_at_ms: i64,
}

/// An address to send commands to, with whatever the registry knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub ip: Ipv4Addr,
    pub device_id: Option<String>,
    pub sku: Option<String>,
}

impl Target {
    /// A target the registry knows nothing about.
    pub fn bare(ip: Ipv4Addr) -> Self {
        Target {
            ip,
            device_id: None,
            sku: None,
        }
    }

    /// Device id for logging, `unknown` when unregistered.
    pub fn label(&self) -> &str {
        self.device_id.as_deref().unwrap_or("unknown")
    }
}
