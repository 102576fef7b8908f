//! Alert notification pipeline.
//!
//! `send` debounces and enqueues; a background worker drains the queue every
//! 30 seconds and delivers per channel, rescheduling failures on an
//! exponential backoff. The debounce map is in-memory only, so a restart may
//! re-send recently fired alerts.

mod email;
mod webhook;

pub use email::Mailer;
pub use webhook::WebhookSender;

use crate::config::NotificationsConfig;
use crate::store::{QueueEntry, Store};
use crate::types::{Alert, Channel, Severity};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// How often the delivery worker wakes
const WORKER_INTERVAL: Duration = Duration::from_secs(30);
/// Entries pulled per worker tick
const WORKER_BATCH: i64 = 50;

/// Retry schedule; attempts beyond the end clamp to the last entry
const BACKOFF: [Duration; 6] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(3600),
    Duration::from_secs(6 * 3600),
    Duration::from_secs(24 * 3600),
];

/// Delay before the next retry after `attempts` prior failures
pub fn backoff_delay(attempts: i64) -> Duration {
    let idx = (attempts.max(0) as usize).min(BACKOFF.len() - 1);
    BACKOFF[idx]
}

pub struct Notifier {
    store: Arc<Store>,
    min_severity: Severity,
    debounce: Duration,
    email_enabled: bool,
    webhook_names: Vec<String>,
    mailer: Mailer,
    webhooks: WebhookSender,
    /// `source_type:source_id:subject` -> last enqueue time (unix seconds)
    last_sent: Mutex<HashMap<String, i64>>,
}

impl Notifier {
    pub fn new(
        store: Arc<Store>,
        cfg: NotificationsConfig,
        debounce: Duration,
        min_severity: Severity,
    ) -> Self {
        let email_enabled = cfg.email.enabled;
        let webhook_names = cfg
            .webhooks
            .iter()
            .filter(|w| !w.url.is_empty())
            .map(|w| w.name.clone())
            .collect();
        Self {
            store,
            min_severity,
            debounce,
            email_enabled,
            webhook_names,
            mailer: Mailer::new(cfg.email.clone()),
            webhooks: WebhookSender::new(cfg.webhooks),
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Persist and enqueue alerts for every configured channel.
    /// Below-threshold and debounced alerts are dropped silently.
    pub fn send(&self, alerts: &[Alert]) {
        for alert in alerts {
            if alert.severity < self.min_severity {
                continue;
            }

            let key = format!(
                "{}:{}:{}",
                alert.source_type, alert.source_id, alert.subject
            );
            if self.is_debounced(&key, alert.timestamp) {
                continue;
            }

            let alert_id = match self.store.add_alert(alert) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to store alert");
                    continue;
                }
            };

            if self.email_enabled {
                if let Err(e) = self.store.enqueue_notification(alert_id, &Channel::Email) {
                    tracing::warn!(error = %e, "failed to queue email notification");
                }
            }
            for name in &self.webhook_names {
                let channel = Channel::Webhook(name.clone());
                if let Err(e) = self.store.enqueue_notification(alert_id, &channel) {
                    tracing::warn!(webhook = %name, error = %e, "failed to queue webhook notification");
                }
            }

            self.mark_sent(&key, alert.timestamp);
        }
    }

    fn is_debounced(&self, key: &str, ts: i64) -> bool {
        let map = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(key) {
            Some(last) => (ts - last) < self.debounce.as_secs() as i64,
            None => false,
        }
    }

    fn mark_sent(&self, key: &str, ts: i64) {
        let mut map = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), ts);
    }

    /// Delivery worker; runs until the shutdown channel fires
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(WORKER_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_pending().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("notifier shutting down");
                    break;
                }
            }
        }
    }

    /// Drain one batch of due queue entries
    pub async fn process_pending(&self) {
        let entries = match self.store.pending_notifications(WORKER_BATCH) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to get pending notifications");
                return;
            }
        };

        for entry in entries {
            self.deliver(&entry).await;
        }
    }

    async fn deliver(&self, entry: &QueueEntry) {
        let alert = match self.store.get_alert(entry.alert_id) {
            Ok(Some(alert)) => alert,
            Ok(None) => {
                tracing::warn!(queue_id = entry.id, alert_id = entry.alert_id, "alert missing for queued notification");
                return;
            }
            Err(e) => {
                tracing::warn!(queue_id = entry.id, error = %e, "failed to load alert");
                return;
            }
        };

        let result = match &entry.channel {
            Channel::Email => self.mailer.send(&alert).await,
            Channel::Webhook(name) => self.webhooks.send(&alert, name).await,
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.store.mark_notification_sent(entry.id) {
                    tracing::warn!(queue_id = entry.id, error = %e, "failed to mark notification sent");
                }
                tracing::debug!(channel = %entry.channel, subject = %alert.subject, "notification sent");
            }
            Err(send_err) => {
                let next_retry =
                    chrono::Utc::now().timestamp() + backoff_delay(entry.attempts).as_secs() as i64;
                if let Err(e) = self.store.mark_notification_failed(
                    entry.id,
                    &send_err.to_string(),
                    next_retry,
                ) {
                    tracing::warn!(queue_id = entry.id, error = %e, "failed to mark notification failed");
                }
                tracing::warn!(
                    channel = %entry.channel,
                    attempts = entry.attempts,
                    error = %send_err,
                    "notification send failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;

    #[test]
    fn test_backoff_sequence() {
        assert_eq!(backoff_delay(0), Duration::from_secs(60));
        assert_eq!(backoff_delay(1), Duration::from_secs(300));
        assert_eq!(backoff_delay(2), Duration::from_secs(900));
        assert_eq!(backoff_delay(3), Duration::from_secs(3600));
        assert_eq!(backoff_delay(4), Duration::from_secs(21600));
        assert_eq!(backoff_delay(5), Duration::from_secs(86400));
        // Clamped past the end of the schedule
        assert_eq!(backoff_delay(6), Duration::from_secs(86400));
        assert_eq!(backoff_delay(50), Duration::from_secs(86400));
    }

    fn alert(severity: Severity, subject: &str, ts: i64) -> Alert {
        Alert {
            id: 0,
            timestamp: ts,
            severity,
            source_type: "disk".into(),
            source_id: "/dev/sda".into(),
            subject: subject.into(),
            message: "m".into(),
            acknowledged: false,
        }
    }

    fn notifier_with_webhook(store: Arc<Store>, min: Severity) -> Notifier {
        let cfg = NotificationsConfig {
            webhooks: vec![WebhookConfig {
                name: "ops".into(),
                url: "https://hooks.example/ops".into(),
            }],
            ..Default::default()
        };
        Notifier::new(store, cfg, Duration::from_secs(3600), min)
    }

    #[test]
    fn test_send_enqueues_per_channel() {
        let store = Arc::new(Store::in_memory().unwrap());
        let notifier = notifier_with_webhook(store.clone(), Severity::Warning);

        notifier.send(&[alert(Severity::Critical, "SMART FAILED", 1000)]);

        let pending = store.pending_notifications(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel, Channel::Webhook("ops".into()));
        // The alert row backing the queue entry exists
        assert!(store.get_alert(pending[0].alert_id).unwrap().is_some());
    }

    #[test]
    fn test_send_respects_min_severity() {
        let store = Arc::new(Store::in_memory().unwrap());
        let notifier = notifier_with_webhook(store.clone(), Severity::Critical);

        notifier.send(&[alert(Severity::Warning, "High temperature", 1000)]);
        assert!(store.pending_notifications(10).unwrap().is_empty());
    }

    #[test]
    fn test_send_debounces_repeat_alerts() {
        let store = Arc::new(Store::in_memory().unwrap());
        let notifier = notifier_with_webhook(store.clone(), Severity::Warning);

        notifier.send(&[alert(Severity::Warning, "High temperature", 1000)]);
        // Identical key inside the window is suppressed
        notifier.send(&[alert(Severity::Warning, "High temperature", 1500)]);
        assert_eq!(store.pending_notifications(10).unwrap().len(), 1);

        // Past the window the same key fires again
        notifier.send(&[alert(Severity::Warning, "High temperature", 1000 + 3601)]);
        assert_eq!(store.pending_notifications(10).unwrap().len(), 2);

        // A different subject is a different key
        notifier.send(&[alert(Severity::Warning, "Pending sectors", 1600)]);
        assert_eq!(store.pending_notifications(10).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_deliver_failure_schedules_backoff() {
        let store = Arc::new(Store::in_memory().unwrap());
        // Webhook name exists in the queue but not in the config, so delivery
        // fails deterministically without touching the network
        let notifier = Notifier::new(
            store.clone(),
            NotificationsConfig::default(),
            Duration::from_secs(3600),
            Severity::Warning,
        );

        let alert_id = store.add_alert(&alert(Severity::Warning, "x", 1000)).unwrap();
        store
            .enqueue_notification(alert_id, &Channel::Webhook("ghost".into()))
            .unwrap();

        notifier.process_pending().await;

        // First failure: attempts 1, next retry ~60s out, still pending
        let all = store.pending_notification_count().unwrap();
        assert_eq!(all, 1);
        assert!(store.pending_notifications(10).unwrap().is_empty());
    }
}
