//! Health evaluation.
//!
//! Scoring is pure: each rule set takes the latest snapshot plus a two-deep
//! history slice and returns a verdict with any alerts it raised. The
//! store-backed provider stitches those together into a report and persists
//! the alerts before returning.

use crate::config::{AlertsConfig, SchedulingConfig};
use crate::error::WardenResult;
use crate::store::Store;
use crate::types::{
    Alert, Disk, DiskClass, DiskHealth, HealthReport, HealthState, NvmeSnapshot, PoolHealth,
    PoolStatus, Severity, SmartSnapshot,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of health reports; the scheduler and uplink depend on this seam
#[async_trait]
pub trait HealthProvider: Send + Sync {
    async fn summary(&self) -> WardenResult<HealthReport>;
}

/// Evaluates health from the latest rows in the store
pub struct StoreBackedProvider {
    store: Arc<Store>,
    scheduling: SchedulingConfig,
    alerts: AlertsConfig,
}

impl StoreBackedProvider {
    pub fn new(store: Arc<Store>, scheduling: SchedulingConfig, alerts: AlertsConfig) -> Self {
        Self {
            store,
            scheduling,
            alerts,
        }
    }
}

#[async_trait]
impl HealthProvider for StoreBackedProvider {
    async fn summary(&self) -> WardenResult<HealthReport> {
        let now = chrono::Utc::now().timestamp();
        let mut disks_health = Vec::new();
        let mut alerts = Vec::new();

        for disk in self.store.list_disks()? {
            let verdict = match disk.class {
                DiskClass::Nvme => {
                    let history = self.store.nvme_history(&disk.id, 2)?;
                    evaluate_nvme_disk(&disk, &history, &self.alerts, now)
                }
                _ => {
                    let history = self.store.smart_history(&disk.id, 2)?;
                    evaluate_smart_disk(&disk, &history, &self.alerts, now)
                }
            };
            disks_health.push(verdict.0);
            alerts.extend(verdict.1);
        }

        let mut pools_health = Vec::new();
        for pool in self.store.list_pools()? {
            let scrub_interval = self.scheduling.zfs_scrub_interval.as_secs() as i64;
            let (health, pool_alerts) = evaluate_pool(&pool, scrub_interval, now);
            pools_health.push(health);
            alerts.extend(pool_alerts);
        }

        for alert in &alerts {
            if let Err(e) = self.store.add_alert(alert) {
                tracing::warn!(error = %e, "failed to persist alert");
            }
        }

        Ok(HealthReport {
            status: composite_status(&alerts),
            disks: disks_health,
            pools: pools_health,
            alerts,
        })
    }
}

/// Report status from the emitted alerts: any critical wins, then warning
pub fn composite_status(alerts: &[Alert]) -> HealthState {
    let mut status = HealthState::Ok;
    for alert in alerts {
        match alert.severity {
            Severity::Critical => return HealthState::Critical,
            Severity::Warning => status = HealthState::Warning,
            Severity::Info => {}
        }
    }
    status
}

fn new_alert(
    severity: Severity,
    source_type: &str,
    source_id: &str,
    subject: &str,
    message: String,
    now: i64,
) -> Alert {
    Alert {
        id: 0,
        timestamp: now,
        severity,
        source_type: source_type.to_string(),
        source_id: source_id.to_string(),
        subject: subject.to_string(),
        message,
        acknowledged: false,
    }
}

/// Score a SATA/SAS disk from its SMART history (newest first, at most two
/// entries used)
pub fn evaluate_smart_disk(
    disk: &Disk,
    history: &[SmartSnapshot],
    cfg: &AlertsConfig,
    now: i64,
) -> (DiskHealth, Vec<Alert>) {
    let mut health = DiskHealth {
        id: disk.id.clone(),
        name: disk.name.clone(),
        class: disk.class,
        status: HealthState::Ok,
        health_score: 100,
        temperature_c: 0.0,
        issues: Vec::new(),
    };
    let mut alerts = Vec::new();

    let Some(snap) = history.first() else {
        return (health, alerts);
    };
    health.temperature_c = snap.temperature_c;

    if snap.health_status == "failed" {
        health.health_score = 10;
        health.status = HealthState::Critical;
        health.issues.push("smart_failed".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "SMART FAILED",
            "SMART overall health failed".into(),
            now,
        ));
    }

    if snap.offline_uncorrectable > 0 {
        health.health_score -= 40;
        health.status = HealthState::Critical;
        health.issues.push("offline_uncorrectable".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "Offline uncorrectable sectors",
            "Drive has uncorrectable sectors that cannot be recovered".into(),
            now,
        ));
    }

    if snap.pending > 0 {
        health.health_score -= 30;
        health.issues.push("pending_sectors".into());
        alerts.push(new_alert(
            Severity::Warning,
            "disk",
            &disk.id,
            "Pending sectors",
            "Drive has sectors waiting to be reallocated".into(),
            now,
        ));
    }

    if snap.reallocated > 0 {
        health.health_score -= 20;
        health.issues.push("reallocated_sectors".into());
    }

    let thresholds = &cfg.temperature_thresholds;
    if snap.temperature_c > thresholds.hdd_critical {
        health.health_score -= 30;
        health.status = HealthState::Critical;
        health.issues.push("temperature_critical".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "Critical temperature",
            format!("Drive temperature is above {:.1}C", thresholds.hdd_critical),
            now,
        ));
    } else if snap.temperature_c > thresholds.hdd_warning {
        health.issues.push("temperature_high".into());
        alerts.push(new_alert(
            Severity::Warning,
            "disk",
            &disk.id,
            "High temperature",
            format!("Drive temperature is above {:.1}C", thresholds.hdd_warning),
            now,
        ));
    }

    if let [curr, prev] = history {
        if curr.reallocated > prev.reallocated {
            let increase = curr.reallocated - prev.reallocated;
            health.health_score -= 15;
            health.issues.push("reallocated_increasing".into());
            alerts.push(new_alert(
                Severity::Warning,
                "disk",
                &disk.id,
                "Reallocated sectors increasing",
                format!("Reallocated sectors increased by {increase}"),
                now,
            ));
        }

        let crc_increase = curr.crc_errors - prev.crc_errors;
        if crc_increase > 10 {
            health.issues.push("crc_errors_increasing".into());
            alerts.push(new_alert(
                Severity::Warning,
                "disk",
                &disk.id,
                "CRC errors increasing",
                format!("CRC errors increased by {crc_increase} (possible cable/connection issue)"),
                now,
            ));
        }
    }

    if snap.crc_errors > 0 {
        health.issues.push("crc_errors".into());
    }

    finish_disk(&mut health);
    (health, alerts)
}

/// Score an NVMe disk from its smart-log history (newest first, at most two
/// entries used)
pub fn evaluate_nvme_disk(
    disk: &Disk,
    history: &[NvmeSnapshot],
    cfg: &AlertsConfig,
    now: i64,
) -> (DiskHealth, Vec<Alert>) {
    let mut health = DiskHealth {
        id: disk.id.clone(),
        name: disk.name.clone(),
        class: disk.class,
        status: HealthState::Ok,
        health_score: 100,
        temperature_c: 0.0,
        issues: Vec::new(),
    };
    let mut alerts = Vec::new();

    let Some(snap) = history.first() else {
        return (health, alerts);
    };
    health.temperature_c = snap.temperature_c;

    let thresholds = &cfg.temperature_thresholds;
    if snap.temperature_c > thresholds.nvme_critical {
        health.health_score -= 30;
        health.status = HealthState::Critical;
        health.issues.push("temperature_critical".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "Critical temperature",
            format!("Drive temperature is above {:.1}C", thresholds.nvme_critical),
            now,
        ));
    } else if snap.temperature_c > thresholds.nvme_warning {
        health.issues.push("temperature_high".into());
        alerts.push(new_alert(
            Severity::Warning,
            "disk",
            &disk.id,
            "High temperature",
            format!("Drive temperature is above {:.1}C", thresholds.nvme_warning),
            now,
        ));
    }

    if snap.percent_used >= 95.0 {
        health.health_score = 20;
        health.status = HealthState::Critical;
        health.issues.push("nvme_wear_high".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "NVMe endurance high",
            "Percent used >=95".into(),
            now,
        ));
    } else if snap.percent_used >= 80.0 {
        health.health_score = 60;
        health.status = HealthState::Warning;
        health.issues.push("nvme_wear_warning".into());
        alerts.push(new_alert(
            Severity::Warning,
            "disk",
            &disk.id,
            "NVMe endurance warning",
            "Percent used >=80".into(),
            now,
        ));
    }

    if snap.media_errors > 0 {
        health.health_score -= 20;
        health.issues.push("nvme_media_errors".into());
        // Only the alert severity splits on the error count; the disk status
        // is left to the score fallback
        let severity = if snap.media_errors > 10 {
            Severity::Critical
        } else {
            Severity::Warning
        };
        alerts.push(new_alert(
            severity,
            "disk",
            &disk.id,
            "NVMe media errors",
            format!("Drive has {} media errors", snap.media_errors),
            now,
        ));
    }

    let flags = &snap.critical_warnings;
    if flags.available_spare_low {
        health.health_score -= 30;
        health.status = HealthState::Critical;
        health.issues.push("nvme_spare_low".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "NVMe spare space low",
            "Available spare space is below threshold".into(),
            now,
        ));
    }
    if flags.temperature_threshold_exceeded {
        health.health_score -= 25;
        health.status = HealthState::Critical;
        health.issues.push("nvme_temp_threshold".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "NVMe temperature threshold exceeded",
            "Temperature is above or below threshold".into(),
            now,
        ));
    }
    if flags.reliability_degraded {
        health.health_score -= 40;
        health.status = HealthState::Critical;
        health.issues.push("nvme_reliability_degraded".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "NVMe reliability degraded",
            "Device reliability is degraded".into(),
            now,
        ));
    }
    if flags.read_only {
        health.health_score = 0;
        health.status = HealthState::Critical;
        health.issues.push("nvme_read_only".into());
        alerts.push(new_alert(
            Severity::Critical,
            "disk",
            &disk.id,
            "NVMe read-only mode",
            "Device has entered read-only mode".into(),
            now,
        ));
    }

    if let [curr, prev] = history {
        if curr.unsafe_shutdowns > prev.unsafe_shutdowns {
            let increase = curr.unsafe_shutdowns - prev.unsafe_shutdowns;
            health.issues.push("unsafe_shutdowns_increased".into());
            alerts.push(new_alert(
                Severity::Warning,
                "disk",
                &disk.id,
                "Unsafe shutdowns increased",
                format!("Unsafe shutdowns increased by {increase}"),
                now,
            ));
        }
    }

    finish_disk(&mut health);
    (health, alerts)
}

fn finish_disk(health: &mut DiskHealth) {
    health.health_score = health.health_score.clamp(0, 100);
    if health.health_score < 60 && health.status != HealthState::Critical {
        health.status = HealthState::Warning;
    }
}

/// Score a ZFS pool; `scrub_interval_secs` 0 disables the scrub-age rules
pub fn evaluate_pool(
    pool: &PoolStatus,
    scrub_interval_secs: i64,
    now: i64,
) -> (PoolHealth, Vec<Alert>) {
    let mut health = PoolHealth {
        name: pool.pool_name.clone(),
        state: pool.state.clone(),
        status: HealthState::Ok,
        health_score: 100,
        issues: Vec::new(),
    };
    let mut alerts = Vec::new();

    if pool.state != "ONLINE" && !pool.state.is_empty() {
        health.status = HealthState::Critical;
        health.health_score = 0;
        health.issues.push(format!("pool_state_{}", pool.state));
        alerts.push(new_alert(
            Severity::Critical,
            "pool",
            &pool.pool_name,
            "Pool not healthy",
            format!("ZFS pool state: {}", pool.state),
            now,
        ));
    }

    if scrub_interval_secs > 0 {
        if pool.last_scrub_time > 0 {
            let since_scrub = now - pool.last_scrub_time;
            if since_scrub > scrub_interval_secs {
                let days_overdue = (since_scrub - scrub_interval_secs) / 86_400;
                health.health_score -= 20;
                health.status = HealthState::Warning;
                health.issues.push("scrub_overdue".into());
                alerts.push(new_alert(
                    Severity::Warning,
                    "pool",
                    &pool.pool_name,
                    "Scrub overdue",
                    format!(
                        "Scrub is {days_overdue} days past the configured interval of {} days",
                        scrub_interval_secs / 86_400
                    ),
                    now,
                ));
            }
        } else {
            health.issues.push("scrub_never".into());
            alerts.push(new_alert(
                Severity::Warning,
                "pool",
                &pool.pool_name,
                "Scrub never run",
                "Pool has never been scrubbed".into(),
                now,
            ));
        }
    }

    if pool.last_scrub_errors > 0 {
        if pool.last_scrub_errors > 100 {
            health.health_score -= 30;
            health.status = HealthState::Critical;
            health.issues.push("scrub_errors_critical".into());
            alerts.push(new_alert(
                Severity::Critical,
                "pool",
                &pool.pool_name,
                "Scrub errors (critical)",
                format!("Last scrub had {} errors", pool.last_scrub_errors),
                now,
            ));
        } else {
            health.health_score -= 15;
            health.status = HealthState::Warning;
            health.issues.push("scrub_errors".into());
            alerts.push(new_alert(
                Severity::Warning,
                "pool",
                &pool.pool_name,
                "Scrub errors",
                format!("Last scrub had {} errors", pool.last_scrub_errors),
                now,
            ));
        }
    }

    health.health_score = health.health_score.clamp(0, 100);
    (health, alerts)
}
