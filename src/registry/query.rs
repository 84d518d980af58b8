//! Read side of the registry.

use std::net::Ipv4Addr;

use log::warn;
use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;

use super::{Device, Endpoint, Interrogation, KeyValue, Registry, Result, ScanEvent, Target};

const DEVICE_COLUMNS: &str = "device_id, ip, sku, ble_version_hard, ble_version_soft,
    wifi_version_hard, wifi_version_soft, mac, first_seen_ms, last_seen_ms,
    last_scan_payload, last_status_payload, extra_json";

/// Parse a stored JSON column. Text that is not JSON is returned as a string.
fn json_column(text: Option<String>) -> Option<Value> {
    let text = text.filter(|t| !t.is_empty())?;
    Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn row_to_device(row: &Row) -> rusqlite::Result<Device> {
    Ok(Device {
        device_id: row.get(0)?,
        ip: row.get(1)?,
        sku: row.get(2)?,
        ble_version_hard: row.get(3)?,
        ble_version_soft: row.get(4)?,
        wifi_version_hard: row.get(5)?,
        wifi_version_soft: row.get(6)?,
        mac: row.get(7)?,
        first_seen_ms: row.get(8)?,
        last_seen_ms: row.get(9)?,
        last_scan_payload: json_column(row.get(10)?),
        last_status_payload: json_column(row.get(11)?),
        extra: json_column(row.get(12)?).unwrap_or_else(|| Value::Object(Default::default())),
    })
}

fn row_to_interrogation(row: &Row) -> rusqlite::Result<Interrogation> {
    Ok(Interrogation {
        device_id: row.get(0)?,
        ip: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        cmd: row.get(2)?,
        sent_at_ms: row.get(3)?,
        received_at_ms: row.get(4)?,
        success: row.get(5)?,
        error: row.get(6)?,
        request: json_column(row.get(7)?).unwrap_or(Value::Null),
        response: json_column(row.get(8)?),
    })
}

impl Registry {
    /// A single device by id.
    pub fn device(&self, device_id: &str) -> Result<Option<Device>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?1"),
                [device_id],
                row_to_device,
            )
            .optional()
        })
    }

    /// All devices, most recently seen first.
    pub fn devices(&self) -> Result<Vec<Device>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY last_seen_ms DESC"
            ))?;
            stmt.query_map([], row_to_device)?.collect()
        })
    }

    /// Devices with a known IP, most recently seen first.
    ///
    /// Rows whose stored IP does not parse are skipped.
    pub fn list_control_targets(&self) -> Result<Vec<Target>> {
        let rows: Vec<(String, String, Option<String>)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT device_id, ip, sku FROM devices
                 WHERE ip IS NOT NULL ORDER BY last_seen_ms DESC",
            )?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect()
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|(device_id, ip, sku)| match ip.parse::<Ipv4Addr>() {
                Ok(ip) => Some(Target {
                    ip,
                    device_id: Some(device_id),
                    sku,
                }),
                Err(_) => {
                    warn!("skipping device {device_id}: unusable ip {ip:?}");
                    None
                }
            })
            .collect())
    }

    /// Scan events, newest first.
    pub fn scan_events(&self, limit: u32, since_ms: Option<i64>) -> Result<Vec<ScanEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT received_at_ms, src_ip, src_port, payload_raw FROM scan_events
                 WHERE ?1 IS NULL OR received_at_ms >= ?1
                 ORDER BY received_at_ms DESC, id DESC
                 LIMIT ?2",
            )?;
            stmt.query_map(params![since_ms, limit], |row| {
                Ok(ScanEvent {
                    received_at_ms: row.get(0)?,
                    src: Endpoint {
                        ip: row.get(1)?,
                        port: row.get(2)?,
                    },
                    payload_raw: row.get(3)?,
                })
            })?
            .collect()
        })
    }

    /// Interrogations, newest first.
    pub fn interrogations(&self, limit: u32, since_ms: Option<i64>) -> Result<Vec<Interrogation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT device_id, ip, cmd, sent_at_ms, received_at_ms,
                        success, error, request_json, response_json
                 FROM interrogations
                 WHERE ?1 IS NULL OR sent_at_ms >= ?1
                 ORDER BY sent_at_ms DESC, id DESC
                 LIMIT ?2",
            )?;
            stmt.query_map(params![since_ms, limit], row_to_interrogation)?
                .collect()
        })
    }

    /// Key/values, most recently updated first, optionally narrowed to one
    /// device and a key prefix.
    pub fn key_values(
        &self,
        device_id: Option<&str>,
        key_prefix: Option<&str>,
        limit: u32,
    ) -> Result<Vec<KeyValue>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT device_id, key, value, updated_at_ms FROM device_kv
                 WHERE (?1 IS NULL OR device_id = ?1)
                   AND (?2 IS NULL OR substr(key, 1, length(?2)) = ?2)
                 ORDER BY updated_at_ms DESC, key ASC
                 LIMIT ?3",
            )?;
            stmt.query_map(params![device_id, key_prefix, limit], |row| {
                Ok(KeyValue {
                    device_id: row.get(0)?,
                    key: row.get(1)?,
                    value: json_column(row.get(2)?).unwrap_or(Value::Null),
                    updated_at_ms: row.get(3)?,
                })
            })?
            .collect()
        })
    }

    /// Tags of a device, sorted.
    pub fn device_tags(&self, device_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT tag FROM device_tags WHERE device_id = ?1 ORDER BY tag")?;
            stmt.query_map([device_id], |row| row.get(0))?.collect()
        })
    }
}
