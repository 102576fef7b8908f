//! Notification queue persistence

use super::store::Store;
use crate::error::WardenResult;
use crate::types::Channel;
use rusqlite::{params, Row};

/// Delivery state of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Sent,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "sent" => Some(QueueStatus::Sent),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

/// One queued delivery
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub alert_id: i64,
    pub channel: Channel,
    pub status: QueueStatus,
    pub attempts: i64,
    pub last_attempt: Option<i64>,
    pub next_retry: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub sent_at: Option<i64>,
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let channel: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(QueueEntry {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        channel: Channel::parse(&channel).unwrap_or(Channel::Email),
        status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Pending),
        attempts: row.get(4)?,
        last_attempt: row.get(5)?,
        next_retry: row.get(6)?,
        error_message: row.get(7)?,
        created_at: row.get(8)?,
        sent_at: row.get(9)?,
    })
}

const QUEUE_COLUMNS: &str = "id, alert_id, channel, status, attempts, last_attempt,
    next_retry, error_message, created_at, sent_at";

impl Store {
    /// Queue a delivery for an alert on one channel
    pub fn enqueue_notification(&self, alert_id: i64, channel: &Channel) -> WardenResult<i64> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO notification_queue (alert_id, channel, status, created_at)
             VALUES (?1, ?2, 'pending', ?3)",
            params![alert_id, channel.tag(), now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Pending entries due now (`next_retry` null or in the past), oldest first
    pub fn pending_notifications(&self, limit: i64) -> WardenResult<Vec<QueueEntry>> {
        let limit = if limit <= 0 { 50 } else { limit };
        let now = chrono::Utc::now().timestamp();
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUEUE_COLUMNS} FROM notification_queue
             WHERE status = 'pending' AND (next_retry IS NULL OR next_retry <= ?1)
             ORDER BY created_at ASC, id ASC
             LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![now, limit], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn mark_notification_sent(&self, queue_id: i64) -> WardenResult<()> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE notification_queue
             SET status = 'sent', sent_at = ?1, next_retry = NULL
             WHERE id = ?2",
            params![now, queue_id],
        )?;
        Ok(())
    }

    /// Record a failed attempt and schedule the retry; status stays pending so
    /// the entry is picked up again once `next_retry` passes
    pub fn mark_notification_failed(
        &self,
        queue_id: i64,
        error: &str,
        next_retry: i64,
    ) -> WardenResult<()> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE notification_queue
             SET attempts = attempts + 1, last_attempt = ?1, next_retry = ?2, error_message = ?3
             WHERE id = ?4",
            params![now, next_retry, error, queue_id],
        )?;
        Ok(())
    }

    /// Count of entries not yet delivered
    pub fn pending_notification_count(&self) -> WardenResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM notification_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) fn get_queue_entry(&self, queue_id: i64) -> WardenResult<Option<QueueEntry>> {
        use rusqlite::OptionalExtension;
        let conn = self.get_conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {QUEUE_COLUMNS} FROM notification_queue WHERE id = ?1"),
                params![queue_id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Alert, Severity};

    fn seed_alert(store: &Store) -> i64 {
        store
            .add_alert(&Alert {
                id: 0,
                timestamp: 1_700_000_000,
                severity: Severity::Critical,
                source_type: "disk".into(),
                source_id: "/dev/sda".into(),
                subject: "SMART FAILED".into(),
                message: "overall health failed".into(),
                acknowledged: false,
            })
            .unwrap()
    }

    #[test]
    fn test_enqueue_and_fetch_pending() {
        let store = Store::in_memory().unwrap();
        let alert_id = seed_alert(&store);

        store.enqueue_notification(alert_id, &Channel::Email).unwrap();
        store
            .enqueue_notification(alert_id, &Channel::Webhook("ops".into()))
            .unwrap();

        let pending = store.pending_notifications(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].channel, Channel::Email);
        assert_eq!(pending[1].channel, Channel::Webhook("ops".into()));
        assert!(pending.iter().all(|e| e.status == QueueStatus::Pending));
        assert!(pending.iter().all(|e| e.next_retry.is_none()));
        assert_eq!(store.pending_notification_count().unwrap(), 2);
    }

    #[test]
    fn test_sent_entries_leave_pending_set() {
        let store = Store::in_memory().unwrap();
        let alert_id = seed_alert(&store);
        let queue_id = store.enqueue_notification(alert_id, &Channel::Email).unwrap();

        store.mark_notification_sent(queue_id).unwrap();

        assert!(store.pending_notifications(10).unwrap().is_empty());
        let entry = store.get_queue_entry(queue_id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Sent);
        assert!(entry.sent_at.is_some());
        assert!(entry.next_retry.is_none());
    }

    #[test]
    fn test_failed_entry_waits_for_next_retry() {
        let store = Store::in_memory().unwrap();
        let alert_id = seed_alert(&store);
        let queue_id = store.enqueue_notification(alert_id, &Channel::Email).unwrap();

        let future = chrono::Utc::now().timestamp() + 3600;
        store
            .mark_notification_failed(queue_id, "webhook returned status 500", future)
            .unwrap();

        // Not due yet
        assert!(store.pending_notifications(10).unwrap().is_empty());

        let entry = store.get_queue_entry(queue_id).unwrap().unwrap();
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.status, QueueStatus::Pending);
        assert_eq!(entry.error_message.as_deref(), Some("webhook returned status 500"));

        // Once next_retry is in the past the entry is due again
        let past = chrono::Utc::now().timestamp() - 1;
        store.mark_notification_failed(queue_id, "again", past).unwrap();
        let due = store.pending_notifications(10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 2);
    }

    #[test]
    fn test_pending_ordered_by_created_at() {
        let store = Store::in_memory().unwrap();
        let alert_id = seed_alert(&store);
        let first = store.enqueue_notification(alert_id, &Channel::Email).unwrap();
        let second = store
            .enqueue_notification(alert_id, &Channel::Webhook("a".into()))
            .unwrap();

        let pending = store.pending_notifications(10).unwrap();
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[1].id, second);
    }
}
