//! End-to-end health evaluation over a seeded store: evaluator output,
//! alert persistence and the notifier enqueue path

use diskwarden::config::{AlertsConfig, NotificationsConfig, SchedulingConfig, WebhookConfig};
use diskwarden::health::{HealthProvider, StoreBackedProvider};
use diskwarden::notify::Notifier;
use diskwarden::store::Store;
use diskwarden::types::{
    Disk, DiskClass, HealthState, NvmeSnapshot, Severity, SmartSnapshot,
};
use std::sync::Arc;
use std::time::Duration;

fn seed_disk(store: &Store, id: &str, name: &str, class: DiskClass) {
    store
        .upsert_disk(&Disk {
            id: id.to_string(),
            name: name.to_string(),
            class,
            model: String::new(),
            serial: String::new(),
            firmware: String::new(),
            size_bytes: 0,
        })
        .unwrap();
}

fn provider(store: &Arc<Store>) -> StoreBackedProvider {
    StoreBackedProvider::new(
        store.clone(),
        SchedulingConfig::default(),
        AlertsConfig::default(),
    )
}

#[tokio::test]
async fn hot_hdd_produces_critical_report_and_persisted_alert() {
    let store = Arc::new(Store::in_memory().unwrap());
    seed_disk(&store, "/dev/disk/by-id/ata-HOT", "/dev/sda", DiskClass::Hdd);
    store
        .add_smart_snapshot(&SmartSnapshot {
            disk_id: "/dev/disk/by-id/ata-HOT".into(),
            timestamp: chrono::Utc::now().timestamp(),
            health_status: "passed".into(),
            temperature_c: 72.0,
            ..Default::default()
        })
        .unwrap();

    let report = provider(&store).summary().await.unwrap();

    assert_eq!(report.status, HealthState::Critical);
    assert_eq!(report.disks.len(), 1);
    assert_eq!(report.disks[0].status, HealthState::Critical);
    assert_eq!(report.disks[0].health_score, 70);
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].subject, "Critical temperature");

    // Evaluation appended the alert to the store
    let recent = store.recent_alerts(10).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].severity, Severity::Critical);
}

#[tokio::test]
async fn worn_nvme_produces_warning_report() {
    let store = Arc::new(Store::in_memory().unwrap());
    seed_disk(
        &store,
        "/dev/disk/by-id/nvme-WORN",
        "/dev/nvme0n1",
        DiskClass::Nvme,
    );
    store
        .add_nvme_snapshot(&NvmeSnapshot {
            disk_id: "/dev/disk/by-id/nvme-WORN".into(),
            timestamp: chrono::Utc::now().timestamp(),
            percent_used: 82.0,
            temperature_c: 50.0,
            ..Default::default()
        })
        .unwrap();

    let report = provider(&store).summary().await.unwrap();

    assert_eq!(report.status, HealthState::Warning);
    assert_eq!(report.disks[0].health_score, 60);
    assert!(report.disks[0]
        .issues
        .contains(&"nvme_wear_warning".to_string()));
    assert_eq!(report.alerts[0].subject, "NVMe endurance warning");
}

#[tokio::test]
async fn overdue_pool_scrub_warns_with_days_overdue() {
    let store = Arc::new(Store::in_memory().unwrap());
    let now = chrono::Utc::now().timestamp();
    store
        .upsert_pool("tank", "ONLINE", now - 40 * 86_400, 0)
        .unwrap();

    let report = provider(&store).summary().await.unwrap();

    assert_eq!(report.status, HealthState::Warning);
    assert_eq!(report.pools.len(), 1);
    assert!(report.pools[0].issues.contains(&"scrub_overdue".to_string()));
    let alert = &report.alerts[0];
    assert_eq!(alert.subject, "Scrub overdue");
    assert!(alert.message.contains("10 days"), "message: {}", alert.message);
}

#[tokio::test]
async fn report_alerts_flow_into_notification_queue() {
    let store = Arc::new(Store::in_memory().unwrap());
    seed_disk(&store, "/dev/disk/by-id/ata-BAD", "/dev/sda", DiskClass::Hdd);
    store
        .add_smart_snapshot(&SmartSnapshot {
            disk_id: "/dev/disk/by-id/ata-BAD".into(),
            timestamp: chrono::Utc::now().timestamp(),
            health_status: "failed".into(),
            ..Default::default()
        })
        .unwrap();

    let report = provider(&store).summary().await.unwrap();
    assert_eq!(report.alerts.len(), 1);

    let notifier = Notifier::new(
        store.clone(),
        NotificationsConfig {
            webhooks: vec![
                WebhookConfig {
                    name: "ops".into(),
                    url: "https://hooks.example/ops".into(),
                },
                WebhookConfig {
                    name: "oncall".into(),
                    url: "https://hooks.example/oncall".into(),
                },
            ],
            ..Default::default()
        },
        Duration::from_secs(3600),
        Severity::Warning,
    );

    notifier.send(&report.alerts);

    // One queue entry per configured webhook, both due immediately
    let pending = store.pending_notifications(10).unwrap();
    assert_eq!(pending.len(), 2);

    // Repeating the same report inside the debounce window adds nothing
    notifier.send(&report.alerts);
    assert_eq!(store.pending_notifications(10).unwrap().len(), 2);
}

#[tokio::test]
async fn disk_without_snapshots_reports_ok() {
    let store = Arc::new(Store::in_memory().unwrap());
    seed_disk(&store, "/dev/disk/by-id/ata-NEW", "/dev/sdb", DiskClass::SataSsd);

    let report = provider(&store).summary().await.unwrap();
    assert_eq!(report.status, HealthState::Ok);
    assert_eq!(report.disks[0].health_score, 100);
    assert!(report.alerts.is_empty());
}
