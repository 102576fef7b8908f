//! Disk rows and pool membership reads

use super::store::Store;
use crate::error::WardenResult;
use crate::types::{Disk, DiskClass, VdevRole};
use rusqlite::{params, OptionalExtension, Row};

/// A disk row including its observation window
#[derive(Debug, Clone)]
pub struct DiskRecord {
    pub disk: Disk,
    /// Unix seconds
    pub first_seen: i64,
    pub last_seen: i64,
}

/// A pool this disk is a member of
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMembership {
    pub pool_name: String,
    pub vdev_role: VdevRole,
}

fn disk_from_row(row: &Row<'_>) -> rusqlite::Result<Disk> {
    let class: String = row.get(2)?;
    Ok(Disk {
        id: row.get(0)?,
        name: row.get(1)?,
        class: DiskClass::parse(&class).unwrap_or(DiskClass::SataSsd),
        model: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        serial: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        firmware: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        size_bytes: row.get(6)?,
    })
}

impl Store {
    /// Insert or refresh a disk; `last_seen` advances on every call
    pub fn upsert_disk(&self, d: &Disk) -> WardenResult<()> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO disks (id, name, type, model, serial, firmware, size_bytes, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                type = excluded.type,
                model = excluded.model,
                serial = excluded.serial,
                firmware = excluded.firmware,
                size_bytes = excluded.size_bytes,
                last_seen = excluded.last_seen",
            params![
                d.id,
                d.name,
                d.class.as_str(),
                d.model,
                d.serial,
                d.firmware,
                d.size_bytes,
                now,
            ],
        )?;
        Ok(())
    }

    /// All known disks ordered by id
    pub fn list_disks(&self) -> WardenResult<Vec<Disk>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, type, model, serial, firmware, size_bytes
             FROM disks ORDER BY id",
        )?;
        let disks = stmt
            .query_map([], disk_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(disks)
    }

    pub fn get_disk(&self, id: &str) -> WardenResult<Option<DiskRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                "SELECT id, name, type, model, serial, firmware, size_bytes, first_seen, last_seen
                 FROM disks WHERE id = ?1",
                params![id],
                |row| {
                    Ok(DiskRecord {
                        disk: disk_from_row(row)?,
                        first_seen: row.get(7)?,
                        last_seen: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Pools the disk currently belongs to
    pub fn disk_pool_membership(&self, disk_id: &str) -> WardenResult<Vec<PoolMembership>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT pool_name, vdev_type FROM zfs_pool_devices WHERE disk_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![disk_id], |row| {
                let role: String = row.get(1)?;
                Ok(PoolMembership {
                    pool_name: row.get(0)?,
                    vdev_role: VdevRole::parse(&role).unwrap_or(VdevRole::Data),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
