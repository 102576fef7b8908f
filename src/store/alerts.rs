//! Alert rows and acknowledgement

use super::store::Store;
use crate::error::{StorageError, WardenResult};
use crate::types::{Alert, Severity};
use rusqlite::{params, OptionalExtension, Row};

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let severity: String = row.get(2)?;
    let ack: i64 = row.get(7)?;
    Ok(Alert {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        severity: Severity::parse(&severity).unwrap_or(Severity::Info),
        source_type: row.get(3)?,
        source_id: row.get(4)?,
        subject: row.get(5)?,
        message: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        acknowledged: ack != 0,
    })
}

const ALERT_COLUMNS: &str =
    "id, timestamp, severity, source_type, source_id, subject, message, acknowledged";

impl Store {
    /// Append an alert, returning its row id
    pub fn add_alert(&self, a: &Alert) -> WardenResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO alerts (timestamp, severity, source_type, source_id, subject, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                a.timestamp,
                a.severity.as_str(),
                a.source_type,
                a.source_id,
                a.subject,
                a.message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent alerts, newest first
    pub fn recent_alerts(&self, limit: i64) -> WardenResult<Vec<Alert>> {
        let limit = if limit <= 0 { 50 } else { limit };
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let alerts = stmt
            .query_map(params![limit], alert_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    pub fn get_alert(&self, id: i64) -> WardenResult<Option<Alert>> {
        let conn = self.get_conn()?;
        let alert = conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                params![id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    /// Flip the acknowledged flag; `NotFound` when the row is absent
    pub fn acknowledge_alert(&self, id: i64) -> WardenResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute("UPDATE alerts SET acknowledged = 1 WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("alert {id}")).into());
        }
        Ok(())
    }

    /// Delete alerts older than `days`
    pub fn prune_old_alerts(&self, days: i64) -> WardenResult<()> {
        let days = if days <= 0 { 90 } else { days };
        let cutoff = chrono::Utc::now().timestamp() - days * 86_400;
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM alerts WHERE timestamp < ?1", params![cutoff])?;
        Ok(())
    }
}
