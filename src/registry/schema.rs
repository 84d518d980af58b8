/// Tables and indexes of the registry. Every statement is idempotent.
///
/// Foreign keys are enforced (see `Registry::init`). Key/values and tags need
/// a known device; interrogations of unregistered targets carry a NULL
/// `device_id` and are always accepted.
pub(super) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS devices (
    device_id TEXT PRIMARY KEY,
    ip TEXT,
    sku TEXT,
    ble_version_hard TEXT,
    ble_version_soft TEXT,
    wifi_version_hard TEXT,
    wifi_version_soft TEXT,
    mac TEXT,
    last_scan_payload TEXT,
    last_status_payload TEXT,
    first_seen_ms INTEGER NOT NULL,
    last_seen_ms INTEGER NOT NULL,
    extra_json TEXT
);

CREATE TABLE IF NOT EXISTS scan_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    received_at_ms INTEGER NOT NULL,
    src_ip TEXT NOT NULL,
    src_port INTEGER NOT NULL,
    payload_raw TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS interrogations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id TEXT,
    ip TEXT,
    cmd TEXT NOT NULL,
    sent_at_ms INTEGER NOT NULL,
    received_at_ms INTEGER,
    success INTEGER NOT NULL,
    error TEXT,
    request_json TEXT NOT NULL,
    response_json TEXT,
    FOREIGN KEY(device_id) REFERENCES devices(device_id)
);

CREATE TABLE IF NOT EXISTS device_kv (
    device_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    PRIMARY KEY(device_id, key),
    FOREIGN KEY(device_id) REFERENCES devices(device_id)
);

CREATE TABLE IF NOT EXISTS device_tags (
    device_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY(device_id, tag),
    FOREIGN KEY(device_id) REFERENCES devices(device_id)
);

CREATE INDEX IF NOT EXISTS idx_devices_last_seen ON devices(last_seen_ms);
CREATE INDEX IF NOT EXISTS idx_scan_events_received ON scan_events(received_at_ms);
CREATE INDEX IF NOT EXISTS idx_interrogations_sent ON interrogations(sent_at_ms);
";
