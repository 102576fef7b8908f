//! ZFS pool state, membership and scrub history

use super::store::Store;
use crate::error::WardenResult;
use crate::types::{PoolStatus, VdevRole};
use rusqlite::{params, OptionalExtension};

/// One scrub run; `end_time` 0 while the scrub is still open
#[derive(Debug, Clone, PartialEq)]
pub struct ScrubHistoryEntry {
    pub pool_name: String,
    pub start_time: i64,
    pub end_time: i64,
    pub errors: i64,
    pub bytes_processed: i64,
    pub notes: String,
}

impl Store {
    /// Insert or refresh a pool; zero scrub time maps to NULL
    pub fn upsert_pool(
        &self,
        name: &str,
        state: &str,
        last_scrub_time: i64,
        last_scrub_errors: i64,
    ) -> WardenResult<()> {
        let conn = self.get_conn()?;
        let scrub_time = if last_scrub_time > 0 {
            Some(last_scrub_time)
        } else {
            None
        };
        conn.execute(
            "INSERT INTO zfs_pools (name, state, last_scrub_time, last_scrub_errors)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                state = excluded.state,
                last_scrub_time = excluded.last_scrub_time,
                last_scrub_errors = excluded.last_scrub_errors",
            params![name, state, scrub_time, last_scrub_errors],
        )?;
        Ok(())
    }

    pub fn list_pools(&self) -> WardenResult<Vec<PoolStatus>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, state, last_scrub_time, last_scrub_errors
             FROM zfs_pools ORDER BY name",
        )?;
        let pools = stmt
            .query_map([], |row| {
                Ok(PoolStatus {
                    pool_name: row.get(0)?,
                    state: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    last_scrub_time: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    last_scrub_errors: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pools)
    }

    /// Replace a pool's device mapping atomically (delete + insert in one tx)
    pub fn upsert_pool_devices(
        &self,
        pool_name: &str,
        device_ids: &[String],
        vdev_role: VdevRole,
    ) -> WardenResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM zfs_pool_devices WHERE pool_name = ?1",
            params![pool_name],
        )?;
        for disk_id in device_ids {
            if disk_id.is_empty() {
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO zfs_pool_devices (pool_name, disk_id, vdev_type)
                 VALUES (?1, ?2, ?3)",
                params![pool_name, disk_id, vdev_role.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn pool_devices(&self, pool_name: &str) -> WardenResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT disk_id FROM zfs_pool_devices WHERE pool_name = ?1 ORDER BY disk_id")?;
        let ids = stmt
            .query_map(params![pool_name], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Last scrub time for a pool; 0 when unknown or never scrubbed
    pub fn last_scrub_time(&self, pool_name: &str) -> WardenResult<i64> {
        let conn = self.get_conn()?;
        let t: Option<Option<i64>> = conn
            .query_row(
                "SELECT last_scrub_time FROM zfs_pools WHERE name = ?1",
                params![pool_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(t.flatten().unwrap_or(0))
    }

    pub fn add_scrub_history(&self, entry: &ScrubHistoryEntry) -> WardenResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO zfs_scrub_history
                (pool_name, start_time, end_time, errors, bytes_processed, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.pool_name,
                entry.start_time,
                entry.end_time,
                entry.errors,
                entry.bytes_processed,
                entry.notes,
            ],
        )?;
        Ok(())
    }

    /// Scrub runs for a pool, newest first
    pub fn scrub_history(&self, pool_name: &str, limit: i64) -> WardenResult<Vec<ScrubHistoryEntry>> {
        let limit = if limit <= 0 { 20 } else { limit };
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT pool_name, start_time, end_time, errors, bytes_processed, notes
             FROM zfs_scrub_history
             WHERE pool_name = ?1
             ORDER BY start_time DESC
             LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![pool_name, limit], |row| {
                Ok(ScrubHistoryEntry {
                    pool_name: row.get(0)?,
                    start_time: row.get(1)?,
                    end_time: row.get(2)?,
                    errors: row.get(3)?,
                    bytes_processed: row.get(4)?,
                    notes: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::disks::PoolMembership;

    #[test]
    fn test_upsert_pool_zero_scrub_time_is_null() {
        let store = Store::in_memory().unwrap();
        store.upsert_pool("tank", "ONLINE", 0, 0).unwrap();

        let pools = store.list_pools().unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].last_scrub_time, 0);
        assert_eq!(store.last_scrub_time("tank").unwrap(), 0);

        store.upsert_pool("tank", "ONLINE", 1_700_000_000, 2).unwrap();
        assert_eq!(store.last_scrub_time("tank").unwrap(), 1_700_000_000);
        assert_eq!(store.list_pools().unwrap()[0].last_scrub_errors, 2);
    }

    #[test]
    fn test_pool_devices_replaced_wholesale() {
        let store = Store::in_memory().unwrap();
        store.upsert_pool("tank", "ONLINE", 0, 0).unwrap();

        store
            .upsert_pool_devices(
                "tank",
                &["/dev/sda".into(), "/dev/sdb".into()],
                VdevRole::Data,
            )
            .unwrap();
        assert_eq!(store.pool_devices("tank").unwrap(), vec!["/dev/sda", "/dev/sdb"]);

        store
            .upsert_pool_devices("tank", &["/dev/sdc".into()], VdevRole::Cache)
            .unwrap();
        assert_eq!(store.pool_devices("tank").unwrap(), vec!["/dev/sdc"]);
    }

    #[test]
    fn test_pool_devices_skips_empty_ids() {
        let store = Store::in_memory().unwrap();
        store.upsert_pool("tank", "ONLINE", 0, 0).unwrap();
        store
            .upsert_pool_devices("tank", &[String::new(), "/dev/sda".into()], VdevRole::Data)
            .unwrap();
        assert_eq!(store.pool_devices("tank").unwrap(), vec!["/dev/sda"]);
    }

    #[test]
    fn test_scrub_history_newest_first() {
        let store = Store::in_memory().unwrap();
        store.upsert_pool("tank", "ONLINE", 0, 0).unwrap();
        for (start, notes) in [(100, "first"), (300, "third"), (200, "second")] {
            store
                .add_scrub_history(&ScrubHistoryEntry {
                    pool_name: "tank".into(),
                    start_time: start,
                    end_time: 0,
                    errors: 0,
                    bytes_processed: 0,
                    notes: notes.into(),
                })
                .unwrap();
        }

        let history = store.scrub_history("tank", 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].notes, "third");
        assert_eq!(history[1].notes, "second");
    }

    #[test]
    fn test_membership_follows_device_mapping() {
        let store = Store::in_memory().unwrap();
        store.upsert_pool("tank", "ONLINE", 0, 0).unwrap();
        store
            .upsert_pool_devices("tank", &["/dev/sda".into()], VdevRole::Spare)
            .unwrap();

        let memberships = store.disk_pool_membership("/dev/sda").unwrap();
        assert_eq!(
            memberships,
            vec![PoolMembership {
                pool_name: "tank".into(),
                vdev_role: VdevRole::Spare
            }]
        );
    }
}
