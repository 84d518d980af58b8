//! SQLite-backed device registry.
//!
//! The registry keeps an append-only log of scan datagrams and control
//! exchanges next to a merged snapshot per device and a free-form key/value
//! table. Every call commits on its own; writers are serialized through one
//! connection.

mod models;
mod query;
mod schema;

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::errors::Error;
use crate::payload::cmd;

pub use models::{
    Device, Endpoint, Interrogation, KeyValue, ScanEvent, ScanObservation, Target,
};

type Result<T> = std::result::Result<T, Error>;

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Handle to the registry database.
///
/// Thread-safe via an internal mutex, so discovery and control may share one
/// handle from different tasks.
pub struct Registry {
    conn: Mutex<Connection>,
}

impl Registry {
    /// Open (and initialize if needed) the database at `path`.
    ///
    /// Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|err| Error::StoreDirectory {
                path: dir.to_path_buf(),
                err,
            })?;
        }

        let conn = Connection::open(path)?;
        debug!("opened registry at {}", path.display());
        Self::init(conn)
    }

    /// A private in-memory registry.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("registry journal_mode={mode}");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::SCHEMA)?;

        Ok(Registry {
            conn: Mutex::new(conn),
        })
    }

    /// Close the connection, reporting any error from SQLite.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().map_err(|_| Error::StoreLock)?;
        conn.close().map_err(|(_, e)| Error::Store(e))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| Error::StoreLock)?;
        Ok(f(&mut conn)?)
    }

    /// Append a raw scan datagram.
    pub fn record_scan_event(&self, event: &ScanEvent) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scan_events(received_at_ms, src_ip, src_port, payload_raw)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.received_at_ms,
                    event.src.ip,
                    event.src.port,
                    event.payload_raw
                ],
            )?;
            Ok(())
        })
    }

    /// Create or merge a device from a scan response.
    ///
    /// Absent fields never overwrite stored ones, `first_seen_ms` is kept
    /// from the first observation and `last_seen_ms` never moves backwards.
    pub fn upsert_device_from_scan(&self, obs: &ScanObservation) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO devices(
                     device_id, ip, sku,
                     ble_version_hard, ble_version_soft,
                     wifi_version_hard, wifi_version_soft,
                     mac, last_scan_payload,
                     first_seen_ms, last_seen_ms, extra_json
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, '{}')
                 ON CONFLICT(device_id) DO UPDATE SET
                     ip = COALESCE(excluded.ip, devices.ip),
                     sku = COALESCE(excluded.sku, devices.sku),
                     ble_version_hard = COALESCE(excluded.ble_version_hard, devices.ble_version_hard),
                     ble_version_soft = COALESCE(excluded.ble_version_soft, devices.ble_version_soft),
                     wifi_version_hard = COALESCE(excluded.wifi_version_hard, devices.wifi_version_hard),
                     wifi_version_soft = COALESCE(excluded.wifi_version_soft, devices.wifi_version_soft),
                     mac = COALESCE(excluded.mac, devices.mac),
                     last_scan_payload = excluded.last_scan_payload,
                     last_seen_ms = MAX(devices.last_seen_ms, excluded.last_seen_ms)",
                params![
                    obs.device_id,
                    obs.ip,
                    obs.sku,
                    obs.ble_version_hard,
                    obs.ble_version_soft,
                    obs.wifi_version_hard,
                    obs.wifi_version_soft,
                    obs.mac,
                    obs.scan_payload,
                    obs.seen_ms,
                ],
            )?;
            Ok(())
        })
    }

    /// Append a control or status attempt.
    ///
    /// A clean `devStatus` reply for a known device also replaces the
    /// device's last status payload, in the same transaction.
    pub fn record_interrogation(&self, entry: &Interrogation) -> Result<()> {
        let request = entry.request.to_string();
        let response = entry.response.as_ref().map(Value::to_string);

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO interrogations(
                     device_id, ip, cmd, sent_at_ms, received_at_ms,
                     success, error, request_json, response_json
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.device_id,
                    entry.ip,
                    entry.cmd,
                    entry.sent_at_ms,
                    entry.received_at_ms,
                    entry.success,
                    entry.error,
                    request,
                    response,
                ],
            )?;

            let clean_status = entry.success && entry.error.is_none() && entry.cmd == cmd::DEV_STATUS;
            if let (true, Some(device_id), Some(response)) =
                (clean_status, &entry.device_id, &response)
            {
                tx.execute(
                    "UPDATE devices SET last_status_payload = ?1 WHERE device_id = ?2",
                    params![response, device_id],
                )?;
            }
            tx.commit()
        })
    }

    /// Set `key` for a device, replacing any earlier value.
    pub fn set_key_value(&self, device_id: &str, key: &str, value: &Value) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO device_kv(device_id, key, value, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(device_id, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at_ms = excluded.updated_at_ms",
                params![device_id, key, value.to_string(), now_ms()],
            )?;
            Ok(())
        })
    }

    /// Add a tag to a device. Tagging twice is a no-op.
    pub fn tag_device(&self, device_id: &str, tag: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO device_tags(device_id, tag) VALUES (?1, ?2)",
                params![device_id, tag],
            )?;
            Ok(())
        })
    }

    /// Last known IP of a device, `None` when the device or its IP is unknown.
    pub fn resolve_ip(&self, device_id: &str) -> Result<Option<std::net::Ipv4Addr>> {
        let ip: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT ip FROM devices WHERE device_id = ?1",
                [device_id],
                |row| row.get(0),
            )
            .optional()
            .map(Option::flatten)
        })?;

        ip.map(|ip| ip.parse().map_err(|_| Error::InvalidAddress(ip)))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;

    pub(super) fn observation(device_id: &str, seen_ms: i64) -> ScanObservation {
        ScanObservation {
            device_id: device_id.to_string(),
            scan_payload: format!(r#"{{"msg":{{"cmd":"scan","data":{{"device":"{device_id}"}}}}}}"#),
            seen_ms,
            ..Default::default()
        }
    }

    fn status_entry(device_id: Option<&str>, error: Option<&str>) -> Interrogation {
        Interrogation {
            device_id: device_id.map(str::to_string),
            ip: "192.168.1.50".to_string(),
            cmd: "devStatus".to_string(),
            sent_at_ms: 1_000,
            received_at_ms: Some(1_010),
            success: true,
            error: error.map(str::to_string),
            request: json!({"msg": {"cmd": "devStatus", "data": {}}}),
            response: Some(json!({"msg": {"cmd": "devStatus", "data": {"onOff": 1}}})),
        }
    }

    #[test]
    fn test_partial_merge_keeps_stored_fields() {
        let registry = Registry::open_in_memory().unwrap();
        registry
            .upsert_device_from_scan(&ScanObservation {
                ip: Some("192.168.1.50".into()),
                sku: Some("H6159".into()),
                mac: Some("aa:bb:cc:dd:ee:ff".into()),
                ..observation("AB:CD", 100)
            })
            .unwrap();
        registry
            .upsert_device_from_scan(&ScanObservation {
                wifi_version_soft: Some("1.02.03".into()),
                ..observation("AB:CD", 200)
            })
            .unwrap();

        let device = registry.device("AB:CD").unwrap().unwrap();
        assert_eq!(device.ip.as_deref(), Some("192.168.1.50"));
        assert_eq!(device.sku.as_deref(), Some("H6159"));
        assert_eq!(device.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(device.wifi_version_soft.as_deref(), Some("1.02.03"));
        assert_eq!(device.first_seen_ms, 100);
        assert_eq!(device.last_seen_ms, 200);
        assert_eq!(device.extra, json!({}));
    }

    #[test]
    fn test_upsert_idempotent() {
        let registry = Registry::open_in_memory().unwrap();
        let obs = ScanObservation {
            ip: Some("10.0.0.7".into()),
            ..observation("dev-1", 500)
        };
        registry.upsert_device_from_scan(&obs).unwrap();
        let first = registry.device("dev-1").unwrap();
        registry.upsert_device_from_scan(&obs).unwrap();

        assert_eq!(registry.device("dev-1").unwrap(), first);
        assert_eq!(registry.devices().unwrap().len(), 1);
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let registry = Registry::open_in_memory().unwrap();
        registry.upsert_device_from_scan(&observation("d", 300)).unwrap();
        registry
            .upsert_device_from_scan(&ScanObservation {
                sku: Some("H6008".into()),
                ..observation("d", 100)
            })
            .unwrap();

        let device = registry.device("d").unwrap().unwrap();
        assert_eq!(device.first_seen_ms, 300);
        assert_eq!(device.last_seen_ms, 300);
        assert_eq!(device.sku.as_deref(), Some("H6008"));
    }

    #[test]
    fn test_status_payload_only_for_clean_known_replies() {
        let registry = Registry::open_in_memory().unwrap();
        registry.upsert_device_from_scan(&observation("AB:CD", 1)).unwrap();

        registry
            .record_interrogation(&status_entry(Some("AB:CD"), Some("unexpected_cmd")))
            .unwrap();
        assert_eq!(
            registry.device("AB:CD").unwrap().unwrap().last_status_payload,
            None
        );

        registry
            .record_interrogation(&status_entry(Some("AB:CD"), None))
            .unwrap();
        assert_eq!(
            registry.device("AB:CD").unwrap().unwrap().last_status_payload,
            Some(json!({"msg": {"cmd": "devStatus", "data": {"onOff": 1}}}))
        );

        // unregistered targets are still logged
        registry.record_interrogation(&status_entry(None, None)).unwrap();
        assert_eq!(registry.interrogations(10, None).unwrap().len(), 3);
    }

    #[test]
    fn test_key_value_overwrite() {
        let registry = Registry::open_in_memory().unwrap();
        registry.upsert_device_from_scan(&observation("d", 1)).unwrap();
        registry
            .set_key_value("d", "status.brightness", &json!(10))
            .unwrap();
        registry
            .set_key_value("d", "status.brightness", &json!(80))
            .unwrap();

        let kv = registry.key_values(Some("d"), None, 100).unwrap();
        assert_eq!(kv.len(), 1);
        assert_eq!(kv[0].value, json!(80));
    }

    #[test]
    fn test_unknown_device_rejected() {
        let registry = Registry::open_in_memory().unwrap();
        assert!(matches!(
            registry.set_key_value("ghost", "status.onOff", &json!(1)),
            Err(Error::Store(_))
        ));
        assert!(matches!(
            registry.tag_device("ghost", "kitchen"),
            Err(Error::Store(_))
        ));
        assert!(registry.key_values(None, None, 100).unwrap().is_empty());

        registry
            .record_interrogation(&status_entry(Some("ghost"), Some("timeout")))
            .unwrap_err();
        registry.record_interrogation(&status_entry(None, None)).unwrap();
        assert_eq!(registry.interrogations(10, None).unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_ip() {
        let registry = Registry::open_in_memory().unwrap();
        assert_eq!(registry.resolve_ip("missing").unwrap(), None);

        registry.upsert_device_from_scan(&observation("no-ip", 1)).unwrap();
        assert_eq!(registry.resolve_ip("no-ip").unwrap(), None);

        registry
            .upsert_device_from_scan(&ScanObservation {
                ip: Some("192.168.1.50".into()),
                ..observation("with-ip", 1)
            })
            .unwrap();
        assert_eq!(
            registry.resolve_ip("with-ip").unwrap(),
            Some(Ipv4Addr::new(192, 168, 1, 50))
        );

        registry
            .upsert_device_from_scan(&ScanObservation {
                ip: Some("not-an-ip".into()),
                ..observation("bad-ip", 1)
            })
            .unwrap();
        assert!(matches!(
            registry.resolve_ip("bad-ip"),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.sqlite");

        let registry = Registry::open(&path).unwrap();
        registry.upsert_device_from_scan(&observation("persisted", 42)).unwrap();
        registry.tag_device("persisted", "kitchen").unwrap();
        registry.close().unwrap();

        let registry = Registry::open(&path).unwrap();
        assert_eq!(registry.devices().unwrap().len(), 1);
        assert_eq!(registry.device_tags("persisted").unwrap(), ["kitchen"]);
    }
}
