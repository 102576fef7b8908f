//! Agent configuration
//!
//! Defaults here match a typical storage server; every option can be
//! overridden through `DISKWARDEN_*` environment variables. Validation
//! failures are fatal at startup.

use crate::error::{WardenError, WardenResult};
use crate::types::Severity;
use std::time::Duration;

/// Device discovery options
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Glob patterns; when non-empty, only matching devices are kept
    pub include_devices: Vec<String>,
    /// Glob patterns; matching devices are dropped (applied first)
    pub exclude_devices: Vec<String>,
    pub zfs_enable: bool,
}

/// Collection cadence; a zero duration disables the corresponding scheduler
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub smart_collect_interval: Duration,
    pub zfs_status_interval: Duration,
    pub smart_short_interval: Duration,
    pub smart_long_interval: Duration,
    pub zfs_scrub_interval: Duration,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            smart_collect_interval: Duration::from_secs(6 * 3600),
            zfs_status_interval: Duration::from_secs(15 * 60),
            smart_short_interval: Duration::from_secs(168 * 3600),
            smart_long_interval: Duration::from_secs(720 * 3600),
            zfs_scrub_interval: Duration::from_secs(720 * 3600),
        }
    }
}

/// Temperature alert thresholds in Celsius
#[derive(Debug, Clone, Copy)]
pub struct TemperatureThresholds {
    pub hdd_warning: f64,
    pub hdd_critical: f64,
    pub nvme_warning: f64,
    pub nvme_critical: f64,
}

impl Default for TemperatureThresholds {
    fn default() -> Self {
        Self {
            hdd_warning: 55.0,
            hdd_critical: 70.0,
            nvme_warning: 70.0,
            nvme_critical: 85.0,
        }
    }
}

/// Alerting policy
#[derive(Debug, Clone)]
pub struct AlertsConfig {
    pub min_severity: Severity,
    pub debounce_window: Duration,
    pub temperature_thresholds: TemperatureThresholds,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Warning,
            debounce_window: Duration::from_secs(6 * 3600),
            temperature_thresholds: TemperatureThresholds::default(),
        }
    }
}

/// SMTP delivery settings
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            to: Vec::new(),
        }
    }
}

/// A named webhook target
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
}

/// Notification channels
#[derive(Debug, Clone, Default)]
pub struct NotificationsConfig {
    pub email: EmailConfig,
    pub webhooks: Vec<WebhookConfig>,
}

/// Cloud uplink settings
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_token: String,
    /// Assigned by the collector on registration
    pub host_id: String,
    pub upload_interval: Duration,
    pub command_poll_interval: Duration,
    /// Bound on the remote command queue; overflow is dropped and counted
    pub command_queue_size: usize,
    /// Hostname override; empty means read from the system
    pub hostname: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_token: String::new(),
            host_id: String::new(),
            upload_interval: Duration::from_secs(15 * 60),
            command_poll_interval: Duration::from_secs(5 * 60),
            command_queue_size: 10,
            hostname: String::new(),
        }
    }
}

/// External probe binaries
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub smartctl: String,
    pub nvme: String,
    pub zpool: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            smartctl: "smartctl".to_string(),
            nvme: "nvme".to_string(),
            zpool: "zpool".to_string(),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub db_path: String,
    /// NDJSON debug log; empty disables the sink
    pub debug_log: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            db_path: "/var/lib/diskwarden/state.db".to_string(),
            debug_log: String::new(),
        }
    }
}

/// Top-level agent configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scheduling: SchedulingConfig,
    pub alerts: AlertsConfig,
    pub notifications: NotificationsConfig,
    pub cloud: CloudConfig,
    pub tools: ToolsConfig,
    pub paths: PathsConfig,
}

impl Config {
    /// Defaults with environment overrides applied
    pub fn from_env() -> WardenResult<Self> {
        let mut cfg = Config {
            storage: StorageConfig {
                zfs_enable: true,
                ..Default::default()
            },
            ..Default::default()
        };

        if let Some(v) = env_str("DISKWARDEN_DB_PATH") {
            cfg.paths.db_path = v;
        }
        if let Some(v) = env_str("DISKWARDEN_DEBUG_LOG") {
            cfg.paths.debug_log = v;
        }
        if let Some(v) = env_str("DISKWARDEN_INCLUDE_DEVICES") {
            cfg.storage.include_devices = split_list(&v);
        }
        if let Some(v) = env_str("DISKWARDEN_EXCLUDE_DEVICES") {
            cfg.storage.exclude_devices = split_list(&v);
        }
        if let Some(v) = env_str("DISKWARDEN_ZFS_ENABLE") {
            cfg.storage.zfs_enable = v == "true" || v == "1";
        }

        if let Some(d) = env_duration("DISKWARDEN_SMART_COLLECT_INTERVAL")? {
            cfg.scheduling.smart_collect_interval = d;
        }
        if let Some(d) = env_duration("DISKWARDEN_ZFS_STATUS_INTERVAL")? {
            cfg.scheduling.zfs_status_interval = d;
        }
        if let Some(d) = env_duration("DISKWARDEN_SMART_SHORT_INTERVAL")? {
            cfg.scheduling.smart_short_interval = d;
        }
        if let Some(d) = env_duration("DISKWARDEN_SMART_LONG_INTERVAL")? {
            cfg.scheduling.smart_long_interval = d;
        }
        if let Some(d) = env_duration("DISKWARDEN_ZFS_SCRUB_INTERVAL")? {
            cfg.scheduling.zfs_scrub_interval = d;
        }

        if let Some(v) = env_str("DISKWARDEN_MIN_SEVERITY") {
            cfg.alerts.min_severity = Severity::parse(&v)
                .ok_or_else(|| WardenError::Config(format!("invalid min_severity: {v}")))?;
        }
        if let Some(d) = env_duration("DISKWARDEN_DEBOUNCE_WINDOW")? {
            cfg.alerts.debounce_window = d;
        }
        if let Some(v) = env_f64("DISKWARDEN_HDD_WARNING_TEMP")? {
            cfg.alerts.temperature_thresholds.hdd_warning = v;
        }
        if let Some(v) = env_f64("DISKWARDEN_HDD_CRITICAL_TEMP")? {
            cfg.alerts.temperature_thresholds.hdd_critical = v;
        }
        if let Some(v) = env_f64("DISKWARDEN_NVME_WARNING_TEMP")? {
            cfg.alerts.temperature_thresholds.nvme_warning = v;
        }
        if let Some(v) = env_f64("DISKWARDEN_NVME_CRITICAL_TEMP")? {
            cfg.alerts.temperature_thresholds.nvme_critical = v;
        }

        if let Some(v) = env_str("DISKWARDEN_SMTP_SERVER") {
            cfg.notifications.email.enabled = true;
            cfg.notifications.email.smtp_server = v;
        }
        if let Some(v) = env_str("DISKWARDEN_SMTP_PORT") {
            cfg.notifications.email.smtp_port = v
                .parse()
                .map_err(|_| WardenError::Config(format!("invalid smtp_port: {v}")))?;
        }
        if let Some(v) = env_str("DISKWARDEN_SMTP_USERNAME") {
            cfg.notifications.email.username = v;
        }
        if let Some(v) = env_str("DISKWARDEN_SMTP_PASSWORD") {
            cfg.notifications.email.password = v;
        }
        if let Some(v) = env_str("DISKWARDEN_EMAIL_FROM") {
            cfg.notifications.email.from = v;
        }
        if let Some(v) = env_str("DISKWARDEN_EMAIL_TO") {
            cfg.notifications.email.to = split_list(&v);
        }
        // name=url pairs, e.g. "ops=https://hooks.example/a,oncall=https://hooks.example/b"
        if let Some(v) = env_str("DISKWARDEN_WEBHOOKS") {
            cfg.notifications.webhooks = v
                .split(',')
                .filter_map(|pair| {
                    let (name, url) = pair.trim().split_once('=')?;
                    Some(WebhookConfig {
                        name: name.to_string(),
                        url: url.to_string(),
                    })
                })
                .collect();
        }

        if let Some(v) = env_str("DISKWARDEN_CLOUD_ENDPOINT") {
            cfg.cloud.enabled = true;
            cfg.cloud.endpoint = v;
        }
        if let Some(v) = env_str("DISKWARDEN_CLOUD_TOKEN") {
            cfg.cloud.api_token = v;
        }
        if let Some(v) = env_str("DISKWARDEN_CLOUD_HOST_ID") {
            cfg.cloud.host_id = v;
        }
        if let Some(d) = env_duration("DISKWARDEN_UPLOAD_INTERVAL")? {
            cfg.cloud.upload_interval = d;
        }
        if let Some(d) = env_duration("DISKWARDEN_COMMAND_POLL_INTERVAL")? {
            cfg.cloud.command_poll_interval = d;
        }
        if let Some(v) = env_str("DISKWARDEN_COMMAND_QUEUE_SIZE") {
            cfg.cloud.command_queue_size = v
                .parse()
                .map_err(|_| WardenError::Config(format!("invalid command_queue_size: {v}")))?;
        }
        if let Some(v) = env_str("DISKWARDEN_HOSTNAME") {
            cfg.cloud.hostname = v;
        }

        if let Some(v) = env_str("DISKWARDEN_SMARTCTL") {
            cfg.tools.smartctl = v;
        }
        if let Some(v) = env_str("DISKWARDEN_NVME") {
            cfg.tools.nvme = v;
        }
        if let Some(v) = env_str("DISKWARDEN_ZPOOL") {
            cfg.tools.zpool = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Startup validation; any failure here is fatal
    pub fn validate(&self) -> WardenResult<()> {
        if self.paths.db_path.is_empty() {
            return Err(WardenError::Config("db_path must be set".into()));
        }
        if self.cloud.enabled && self.cloud.endpoint.is_empty() {
            return Err(WardenError::Config(
                "cloud.endpoint must be set when cloud is enabled".into(),
            ));
        }
        if self.cloud.command_queue_size == 0 {
            return Err(WardenError::Config(
                "cloud.command_queue_size must be at least 1".into(),
            ));
        }
        if self.notifications.email.enabled {
            if self.notifications.email.smtp_server.is_empty() {
                return Err(WardenError::Config(
                    "email.smtp_server must be set when email is enabled".into(),
                ));
            }
            if self.notifications.email.to.is_empty() {
                return Err(WardenError::Config(
                    "email.to must not be empty when email is enabled".into(),
                ));
            }
        }
        Ok(())
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_f64(key: &str) -> WardenResult<Option<f64>> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| WardenError::Config(format!("invalid {key}: {v}"))),
    }
}

fn env_duration(key: &str) -> WardenResult<Option<Duration>> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => humantime::parse_duration(&v)
            .map(Some)
            .map_err(|e| WardenError::Config(format!("invalid {key}: {e}"))),
    }
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.scheduling.smart_collect_interval, Duration::from_secs(21600));
        assert_eq!(cfg.alerts.min_severity, Severity::Warning);
        assert_eq!(cfg.alerts.temperature_thresholds.hdd_warning, 55.0);
        assert_eq!(cfg.alerts.temperature_thresholds.nvme_critical, 85.0);
        assert_eq!(cfg.cloud.command_queue_size, 10);
        assert!(!cfg.notifications.email.enabled);
    }

    #[test]
    fn test_validate_cloud_requires_endpoint() {
        let mut cfg = Config::default();
        cfg.cloud.enabled = true;
        assert!(cfg.validate().is_err());

        cfg.cloud.endpoint = "https://collector.example".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_email_requires_server_and_recipients() {
        let mut cfg = Config::default();
        cfg.notifications.email.enabled = true;
        assert!(cfg.validate().is_err());

        cfg.notifications.email.smtp_server = "mail.example".into();
        assert!(cfg.validate().is_err());

        cfg.notifications.email.to = vec!["ops@example.com".into()];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_queue_rejected() {
        let mut cfg = Config::default();
        cfg.cloud.command_queue_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
