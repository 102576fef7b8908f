//! SMART and NVMe snapshot persistence

use super::store::Store;
use crate::error::WardenResult;
use crate::types::{NvmeSnapshot, SmartSnapshot};
use rusqlite::{params, Row};

fn smart_from_row(row: &Row<'_>) -> rusqlite::Result<SmartSnapshot> {
    Ok(SmartSnapshot {
        disk_id: row.get(0)?,
        timestamp: row.get(1)?,
        health_status: row.get(2)?,
        reallocated: row.get(3)?,
        pending: row.get(4)?,
        offline_uncorrectable: row.get(5)?,
        crc_errors: row.get(6)?,
        temperature_c: row.get(7)?,
        power_on_hours: row.get(8)?,
        spin_retry_count: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
        load_cycle_count: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        raw_json: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
    })
}

fn nvme_from_row(row: &Row<'_>) -> rusqlite::Result<NvmeSnapshot> {
    let flags_json: Option<String> = row.get(10)?;
    let critical_warnings = flags_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    Ok(NvmeSnapshot {
        disk_id: row.get(0)?,
        timestamp: row.get(1)?,
        percent_used: row.get(2)?,
        media_errors: row.get(3)?,
        error_log_entries: row.get(4)?,
        unsafe_shutdowns: row.get(5)?,
        power_on_hours: row.get(6)?,
        temperature_c: row.get(7)?,
        data_written_bytes: row.get(8)?,
        data_read_bytes: row.get(9)?,
        critical_warnings,
        raw_output: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
    })
}

const SMART_COLUMNS: &str = "disk_id, timestamp, health_status, reallocated, pending,
    offline_uncorrectable, crc_errors, temperature_c, power_on_hours,
    spin_retry_count, load_cycle_count, raw_json";

const NVME_COLUMNS: &str = "disk_id, timestamp, percent_used, media_errors, error_log_entries,
    unsafe_shutdowns, power_on_hours, temperature_c, data_written_bytes,
    data_read_bytes, critical_warning_flags, raw_output";

impl Store {
    pub fn add_smart_snapshot(&self, snap: &SmartSnapshot) -> WardenResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO smart_snapshots ({SMART_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                snap.disk_id,
                snap.timestamp,
                snap.health_status,
                snap.reallocated,
                snap.pending,
                snap.offline_uncorrectable,
                snap.crc_errors,
                snap.temperature_c,
                snap.power_on_hours,
                snap.spin_retry_count,
                snap.load_cycle_count,
                snap.raw_json,
            ],
        )?;
        Ok(())
    }

    pub fn add_nvme_snapshot(&self, snap: &NvmeSnapshot) -> WardenResult<()> {
        let flags_json = serde_json::to_string(&snap.critical_warnings)?;
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO nvme_snapshots ({NVME_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                snap.disk_id,
                snap.timestamp,
                snap.percent_used,
                snap.media_errors,
                snap.error_log_entries,
                snap.unsafe_shutdowns,
                snap.power_on_hours,
                snap.temperature_c,
                snap.data_written_bytes,
                snap.data_read_bytes,
                flags_json,
                snap.raw_output,
            ],
        )?;
        Ok(())
    }

    pub fn latest_smart(&self, disk_id: &str) -> WardenResult<Option<SmartSnapshot>> {
        Ok(self.smart_history(disk_id, 1)?.into_iter().next())
    }

    pub fn latest_nvme(&self, disk_id: &str) -> WardenResult<Option<NvmeSnapshot>> {
        Ok(self.nvme_history(disk_id, 1)?.into_iter().next())
    }

    /// Recent SMART samples, newest first
    pub fn smart_history(&self, disk_id: &str, limit: i64) -> WardenResult<Vec<SmartSnapshot>> {
        let limit = if limit <= 0 { 20 } else { limit };
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SMART_COLUMNS} FROM smart_snapshots
             WHERE disk_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))?;
        let snaps = stmt
            .query_map(params![disk_id, limit], smart_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snaps)
    }

    /// Recent NVMe samples, newest first
    pub fn nvme_history(&self, disk_id: &str, limit: i64) -> WardenResult<Vec<NvmeSnapshot>> {
        let limit = if limit <= 0 { 20 } else { limit };
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NVME_COLUMNS} FROM nvme_snapshots
             WHERE disk_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))?;
        let snaps = stmt
            .query_map(params![disk_id, limit], nvme_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snaps)
    }

    /// Delete smart and nvme snapshots older than `days`
    pub fn prune_old_snapshots(&self, days: i64) -> WardenResult<()> {
        let days = if days <= 0 { 90 } else { days };
        let cutoff = chrono::Utc::now().timestamp() - days * 86_400;
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM smart_snapshots WHERE timestamp < ?1",
            params![cutoff],
        )?;
        conn.execute(
            "DELETE FROM nvme_snapshots WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(())
    }
}
