//! File-backed store behavior: persistence across reopen and retention

use diskwarden::store::Store;
use diskwarden::types::{Disk, DiskClass, SmartSnapshot};
use tempfile::tempdir;

fn disk(id: &str, name: &str) -> Disk {
    Disk {
        id: id.to_string(),
        name: name.to_string(),
        class: DiskClass::Hdd,
        model: "ST8000VN004".to_string(),
        serial: "ZL001".to_string(),
        firmware: "SC60".to_string(),
        size_bytes: 8_001_563_222_016,
    }
}

#[test]
fn disks_and_snapshots_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = Store::open(&path).unwrap();
        store.upsert_disk(&disk("/dev/disk/by-id/ata-ST8000-ZL001", "/dev/sda")).unwrap();
        store
            .add_smart_snapshot(&SmartSnapshot {
                disk_id: "/dev/disk/by-id/ata-ST8000-ZL001".into(),
                timestamp: 1_700_000_000,
                health_status: "passed".into(),
                reallocated: 3,
                temperature_c: 38.5,
                ..Default::default()
            })
            .unwrap();
    }

    let store = Store::open(&path).unwrap();
    let disks = store.list_disks().unwrap();
    assert_eq!(disks.len(), 1);
    assert_eq!(disks[0].model, "ST8000VN004");

    let latest = store.latest_smart("/dev/disk/by-id/ata-ST8000-ZL001").unwrap().unwrap();
    assert_eq!(latest.reallocated, 3);
    assert_eq!(latest.temperature_c, 38.5);
}

#[test]
fn latest_matches_history_head_after_many_inserts() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("state.db")).unwrap();
    let id = "/dev/disk/by-id/ata-X";

    for i in 0..30 {
        store
            .add_smart_snapshot(&SmartSnapshot {
                disk_id: id.into(),
                timestamp: 1_700_000_000 + i * 60,
                health_status: "passed".into(),
                crc_errors: i,
                ..Default::default()
            })
            .unwrap();
    }

    let history = store.smart_history(id, 0).unwrap();
    // Zero limit falls back to the default window
    assert_eq!(history.len(), 20);
    let latest = store.latest_smart(id).unwrap().unwrap();
    assert_eq!(latest, history[0]);
    assert_eq!(latest.crc_errors, 29);

    // Strictly descending timestamps
    for pair in history.windows(2) {
        assert!(pair[0].timestamp > pair[1].timestamp);
    }
}

#[test]
fn prune_retains_everything_newer_than_cutoff() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("state.db")).unwrap();
    let now = chrono::Utc::now().timestamp();

    for days_ago in [1, 30, 89, 91, 200] {
        store
            .add_smart_snapshot(&SmartSnapshot {
                disk_id: "/dev/sda".into(),
                timestamp: now - days_ago * 86_400,
                health_status: "passed".into(),
                ..Default::default()
            })
            .unwrap();
    }

    store.prune_old_snapshots(90).unwrap();

    let remaining = store.smart_history("/dev/sda", 20).unwrap();
    assert_eq!(remaining.len(), 3);
    let cutoff = now - 90 * 86_400;
    assert!(remaining.iter().all(|s| s.timestamp >= cutoff));
}
