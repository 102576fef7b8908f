//! Shared types crossing the store, health, notifier and uplink boundaries.
//!
//! Enumerated values (`DiskClass`, `Severity`, ...) are closed variant sets;
//! their string forms exist only at the DB and JSON boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device class as reported by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskClass {
    Hdd,
    SataSsd,
    Nvme,
}

impl DiskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskClass::Hdd => "hdd",
            DiskClass::SataSsd => "sata_ssd",
            DiskClass::Nvme => "nvme",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hdd" => Some(DiskClass::Hdd),
            "sata_ssd" => Some(DiskClass::SataSsd),
            "nvme" => Some(DiskClass::Nvme),
            _ => None,
        }
    }
}

impl fmt::Display for DiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered info < warning < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite status for disks, pools and the whole report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Warning,
    Critical,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Ok => "ok",
            HealthState::Warning => "warning",
            HealthState::Critical => "critical",
        }
    }
}

/// Role of a device inside a ZFS pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VdevRole {
    Data,
    Cache,
    Log,
    Spare,
}

impl VdevRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            VdevRole::Data => "data",
            VdevRole::Cache => "cache",
            VdevRole::Log => "log",
            VdevRole::Spare => "spare",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data" => Some(VdevRole::Data),
            "cache" => Some(VdevRole::Cache),
            "log" => Some(VdevRole::Log),
            "spare" => Some(VdevRole::Spare),
            _ => None,
        }
    }
}

/// SMART self-test variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    Short,
    Long,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Short => "short",
            TestType::Long => "long",
        }
    }
}

/// Task identifiers used by cloud schedules and the scheduler loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    SmartCollect,
    NvmeCollect,
    ZfsStatus,
    ZfsScrub,
    SmartShortTest,
    SmartLongTest,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SmartCollect => "SMART_COLLECT",
            TaskType::NvmeCollect => "NVME_COLLECT",
            TaskType::ZfsStatus => "ZFS_STATUS",
            TaskType::ZfsScrub => "ZFS_SCRUB",
            TaskType::SmartShortTest => "SMART_SHORT_TEST",
            TaskType::SmartLongTest => "SMART_LONG_TEST",
        }
    }
}

/// Cloud schedule kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Interval,
    Cron,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Interval => "INTERVAL",
            ScheduleKind::Cron => "CRON",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INTERVAL" => Some(ScheduleKind::Interval),
            "CRON" => Some(ScheduleKind::Cron),
            _ => None,
        }
    }
}

/// Notification delivery channel
///
/// The queue row stores the tagged string form (`email`, `webhook:<name>`);
/// dispatch pattern-matches on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Email,
    Webhook(String),
}

impl Channel {
    pub fn tag(&self) -> String {
        match self {
            Channel::Email => "email".to_string(),
            Channel::Webhook(name) => format!("webhook:{name}"),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s == "email" {
            return Some(Channel::Email);
        }
        s.strip_prefix("webhook:")
            .map(|name| Channel::Webhook(name.to_string()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// A discovered block device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    /// Stable identifier: `/dev/disk/by-id/...` when resolvable, else `/dev/<name>`
    pub id: String,
    /// Kernel device path, e.g. `/dev/sda`
    pub name: String,
    #[serde(rename = "type")]
    pub class: DiskClass,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub firmware: String,
    #[serde(default)]
    pub size_bytes: i64,
}

/// ZFS pool state row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub pool_name: String,
    pub state: String,
    /// Unix seconds; 0 when the pool has never been scrubbed
    #[serde(default)]
    pub last_scrub_time: i64,
    #[serde(default)]
    pub last_scrub_errors: i64,
}

/// One SMART telemetry sample (append-only)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartSnapshot {
    pub disk_id: String,
    /// Unix seconds
    pub timestamp: i64,
    /// `passed`, `failed` or `unknown`
    pub health_status: String,
    pub reallocated: i64,
    pub pending: i64,
    pub offline_uncorrectable: i64,
    pub crc_errors: i64,
    pub spin_retry_count: i64,
    pub load_cycle_count: i64,
    pub power_on_hours: i64,
    pub temperature_c: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_json: String,
}

/// Decoded NVMe critical-warning bitfield (bits 0..3)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalWarningFlags {
    pub available_spare_low: bool,
    pub temperature_threshold_exceeded: bool,
    pub reliability_degraded: bool,
    pub read_only: bool,
}

impl CriticalWarningFlags {
    /// Decode from the raw critical_warning byte
    pub fn from_bits(bits: i64) -> Self {
        Self {
            available_spare_low: bits & 0x01 != 0,
            temperature_threshold_exceeded: bits & 0x02 != 0,
            reliability_degraded: bits & 0x04 != 0,
            read_only: bits & 0x08 != 0,
        }
    }
}

/// One NVMe smart-log sample (append-only)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NvmeSnapshot {
    pub disk_id: String,
    /// Unix seconds
    pub timestamp: i64,
    pub percent_used: f64,
    pub media_errors: i64,
    pub error_log_entries: i64,
    pub unsafe_shutdowns: i64,
    pub power_on_hours: i64,
    pub temperature_c: f64,
    pub data_written_bytes: i64,
    pub data_read_bytes: i64,
    pub critical_warnings: CriticalWarningFlags,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_output: String,
}

/// Per-disk health verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskHealth {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub class: DiskClass,
    pub status: HealthState,
    pub health_score: i32,
    #[serde(default)]
    pub temperature_c: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// Per-pool health verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHealth {
    pub name: String,
    pub state: String,
    pub status: HealthState,
    pub health_score: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// An alert emitted by the health evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub id: i64,
    /// Unix seconds
    pub timestamp: i64,
    pub severity: Severity,
    /// `disk` or `pool`
    pub source_type: String,
    pub source_id: String,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub acknowledged: bool,
}

/// Composite health report returned by the evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub disks: Vec<DiskHealth>,
    pub pools: Vec<PoolHealth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<Alert>,
}

/// A schedule pushed from the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSchedule {
    pub id: String,
    pub task_type: String,
    pub schedule_type: String,
    pub schedule_value: String,
    pub enabled: bool,
    /// Unix seconds
    #[serde(default)]
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_class_round_trip() {
        for class in [DiskClass::Hdd, DiskClass::SataSsd, DiskClass::Nvme] {
            assert_eq!(DiskClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(DiskClass::parse("floppy"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("bogus"), None);
    }

    #[test]
    fn test_channel_tag_round_trip() {
        assert_eq!(Channel::parse("email"), Some(Channel::Email));
        assert_eq!(
            Channel::parse("webhook:ops"),
            Some(Channel::Webhook("ops".into()))
        );
        assert_eq!(Channel::Webhook("ops".into()).tag(), "webhook:ops");
        assert_eq!(Channel::parse("telegram:x"), None);
    }

    #[test]
    fn test_critical_warning_bits() {
        let flags = CriticalWarningFlags::from_bits(0x0B);
        assert!(flags.available_spare_low);
        assert!(flags.temperature_threshold_exceeded);
        assert!(!flags.reliability_degraded);
        assert!(flags.read_only);

        assert_eq!(CriticalWarningFlags::from_bits(0), CriticalWarningFlags::default());
    }

    #[test]
    fn test_schedule_kind_parse() {
        assert_eq!(ScheduleKind::parse("INTERVAL"), Some(ScheduleKind::Interval));
        assert_eq!(ScheduleKind::parse("CRON"), Some(ScheduleKind::Cron));
        assert_eq!(ScheduleKind::parse("interval"), None);
    }

    #[test]
    fn test_disk_serde_type_field() {
        let disk = Disk {
            id: "/dev/disk/by-id/ata-X".into(),
            name: "/dev/sda".into(),
            class: DiskClass::SataSsd,
            model: "X".into(),
            serial: "S".into(),
            firmware: String::new(),
            size_bytes: 512,
        };
        let json = serde_json::to_value(&disk).unwrap();
        assert_eq!(json["type"], "sata_ssd");
        assert!(json.get("firmware").is_none());
    }
}
