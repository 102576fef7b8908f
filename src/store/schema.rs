//! SQLite schema and column-level migration

use crate::error::WardenResult;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Create all tables (idempotent)
pub fn create_tables(conn: &Connection) -> WardenResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Bring an existing database up to the current schema.
///
/// SQLite has no `ALTER TABLE ... ADD COLUMN IF NOT EXISTS`, so columns that
/// arrived after the first release are added by inspecting `PRAGMA
/// table_info` and altering only when missing. Tables are never rebuilt.
pub fn migrate(conn: &Connection) -> WardenResult<()> {
    add_column_if_missing(conn, "smart_snapshots", "spin_retry_count", "INTEGER DEFAULT 0")?;
    add_column_if_missing(conn, "smart_snapshots", "load_cycle_count", "INTEGER DEFAULT 0")?;
    add_column_if_missing(conn, "disks", "firmware", "TEXT")?;
    add_column_if_missing(conn, "nvme_snapshots", "raw_output", "TEXT")?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> WardenResult<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == column);

    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))?;
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Agent metadata
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Discovered block devices, keyed by stable by-id path
CREATE TABLE IF NOT EXISTS disks (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    type        TEXT NOT NULL,
    model       TEXT,
    serial      TEXT,
    firmware    TEXT,
    size_bytes  INTEGER NOT NULL DEFAULT 0,
    first_seen  INTEGER NOT NULL,
    last_seen   INTEGER NOT NULL
);

-- SMART telemetry, append-only
CREATE TABLE IF NOT EXISTS smart_snapshots (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    disk_id               TEXT NOT NULL,
    timestamp             INTEGER NOT NULL,
    health_status         TEXT NOT NULL,
    reallocated           INTEGER NOT NULL DEFAULT 0,
    pending               INTEGER NOT NULL DEFAULT 0,
    offline_uncorrectable INTEGER NOT NULL DEFAULT 0,
    crc_errors            INTEGER NOT NULL DEFAULT 0,
    temperature_c         REAL NOT NULL DEFAULT 0,
    power_on_hours        INTEGER NOT NULL DEFAULT 0,
    spin_retry_count      INTEGER DEFAULT 0,
    load_cycle_count      INTEGER DEFAULT 0,
    raw_json              TEXT,
    FOREIGN KEY (disk_id) REFERENCES disks(id)
);

-- NVMe telemetry, append-only
CREATE TABLE IF NOT EXISTS nvme_snapshots (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    disk_id                TEXT NOT NULL,
    timestamp              INTEGER NOT NULL,
    percent_used           REAL NOT NULL DEFAULT 0,
    media_errors           INTEGER NOT NULL DEFAULT 0,
    error_log_entries      INTEGER NOT NULL DEFAULT 0,
    unsafe_shutdowns       INTEGER NOT NULL DEFAULT 0,
    power_on_hours         INTEGER NOT NULL DEFAULT 0,
    temperature_c          REAL NOT NULL DEFAULT 0,
    data_written_bytes     INTEGER NOT NULL DEFAULT 0,
    data_read_bytes        INTEGER NOT NULL DEFAULT 0,
    critical_warning_flags TEXT,
    raw_output             TEXT,
    FOREIGN KEY (disk_id) REFERENCES disks(id)
);

-- ZFS pools
CREATE TABLE IF NOT EXISTS zfs_pools (
    name              TEXT PRIMARY KEY,
    state             TEXT,
    last_scrub_time   INTEGER,
    last_scrub_errors INTEGER
);

-- Pool membership; replaced wholesale per pool on each discovery pass
CREATE TABLE IF NOT EXISTS zfs_pool_devices (
    pool_name TEXT NOT NULL,
    disk_id   TEXT NOT NULL,
    vdev_type TEXT NOT NULL,
    PRIMARY KEY (pool_name, disk_id),
    FOREIGN KEY (pool_name) REFERENCES zfs_pools(name) ON DELETE CASCADE
);

-- Scrub runs, append-only
CREATE TABLE IF NOT EXISTS zfs_scrub_history (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    pool_name       TEXT NOT NULL,
    start_time      INTEGER NOT NULL,
    end_time        INTEGER NOT NULL DEFAULT 0,
    errors          INTEGER NOT NULL DEFAULT 0,
    bytes_processed INTEGER NOT NULL DEFAULT 0,
    notes           TEXT,
    FOREIGN KEY (pool_name) REFERENCES zfs_pools(name)
);

-- Last self-test start per (disk, test type)
CREATE TABLE IF NOT EXISTS smart_test_log (
    disk_id       TEXT NOT NULL,
    test_type     TEXT NOT NULL,
    last_run_time INTEGER NOT NULL,
    PRIMARY KEY (disk_id, test_type),
    FOREIGN KEY (disk_id) REFERENCES disks(id) ON DELETE CASCADE
);

-- Alerts, append-only except the acknowledged flip
CREATE TABLE IF NOT EXISTS alerts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    INTEGER NOT NULL,
    severity     TEXT NOT NULL,
    source_type  TEXT NOT NULL,
    source_id    TEXT NOT NULL,
    subject      TEXT NOT NULL,
    message      TEXT,
    acknowledged INTEGER NOT NULL DEFAULT 0
);

-- Outbound notification queue
CREATE TABLE IF NOT EXISTS notification_queue (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id      INTEGER NOT NULL,
    channel       TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    attempts      INTEGER NOT NULL DEFAULT 0,
    last_attempt  INTEGER,
    next_retry    INTEGER,
    error_message TEXT,
    created_at    INTEGER NOT NULL,
    sent_at       INTEGER,
    FOREIGN KEY (alert_id) REFERENCES alerts(id) ON DELETE CASCADE
);

-- Schedules pushed from the cloud
CREATE TABLE IF NOT EXISTS cloud_schedules (
    id             TEXT PRIMARY KEY,
    task_type      TEXT NOT NULL,
    schedule_type  TEXT NOT NULL,
    schedule_value TEXT NOT NULL,
    enabled        INTEGER NOT NULL DEFAULT 1,
    updated_at     INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_smart_snapshots_disk_ts ON smart_snapshots(disk_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_nvme_snapshots_disk_ts ON nvme_snapshots(disk_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
CREATE INDEX IF NOT EXISTS idx_queue_status ON notification_queue(status, next_retry);
CREATE INDEX IF NOT EXISTS idx_scrub_history_pool ON zfs_scrub_history(pool_name, start_time);
"#;
