//! Cloud schedules and SMART self-test bookkeeping

use super::store::Store;
use crate::error::WardenResult;
use crate::types::{CloudSchedule, TaskType, TestType};
use rusqlite::{params, OptionalExtension, Row};

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<CloudSchedule> {
    let enabled: i64 = row.get(4)?;
    Ok(CloudSchedule {
        id: row.get(0)?,
        task_type: row.get(1)?,
        schedule_type: row.get(2)?,
        schedule_value: row.get(3)?,
        enabled: enabled != 0,
        updated_at: row.get(5)?,
    })
}

const SCHEDULE_COLUMNS: &str = "id, task_type, schedule_type, schedule_value, enabled, updated_at";

impl Store {
    /// Upsert schedules by id; disabled rows are retained but ignored by lookup
    pub fn store_schedules(&self, schedules: &[CloudSchedule]) -> WardenResult<()> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for sched in schedules {
            tx.execute(
                "INSERT INTO cloud_schedules
                    (id, task_type, schedule_type, schedule_value, enabled, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    task_type = excluded.task_type,
                    schedule_type = excluded.schedule_type,
                    schedule_value = excluded.schedule_value,
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at",
                params![
                    sched.id,
                    sched.task_type,
                    sched.schedule_type,
                    sched.schedule_value,
                    sched.enabled as i64,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Enabled schedules, grouped by task, newest first within a task
    pub fn list_schedules(&self) -> WardenResult<Vec<CloudSchedule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM cloud_schedules
             WHERE enabled = 1
             ORDER BY task_type, updated_at DESC"
        ))?;
        let schedules = stmt
            .query_map([], schedule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Newest enabled schedule for one task type
    pub fn schedule_for_task(&self, task: TaskType) -> WardenResult<Option<CloudSchedule>> {
        let conn = self.get_conn()?;
        let sched = conn
            .query_row(
                &format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM cloud_schedules
                     WHERE task_type = ?1 AND enabled = 1
                     ORDER BY updated_at DESC, id DESC
                     LIMIT 1"
                ),
                params![task.as_str()],
                schedule_from_row,
            )
            .optional()?;
        Ok(sched)
    }

    /// Last self-test start for (disk, test type); 0 when never run
    pub fn last_smart_test_time(&self, disk_id: &str, test: TestType) -> WardenResult<i64> {
        let conn = self.get_conn()?;
        let t: Option<i64> = conn
            .query_row(
                "SELECT last_run_time FROM smart_test_log
                 WHERE disk_id = ?1 AND test_type = ?2",
                params![disk_id, test.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(t.unwrap_or(0))
    }

    /// Record that a self-test was started now
    pub fn record_smart_test(&self, disk_id: &str, test: TestType) -> WardenResult<()> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO smart_test_log (disk_id, test_type, last_run_time)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(disk_id, test_type) DO UPDATE SET
                last_run_time = excluded.last_run_time",
            params![disk_id, test.as_str(), now],
        )?;
        Ok(())
    }
}
