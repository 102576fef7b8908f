//! Run-loop engine.
//!
//! One tokio task per periodic pipeline, all hanging off a shared broadcast
//! shutdown. Every tick re-derives its effective interval by merging the
//! configured cadence with any cloud-pushed schedule, so a schedule change
//! takes effect on the next wake without restarting anything. Remote
//! commands flow through a bounded queue with a single serial consumer.

pub mod cron;

use crate::collectors::{NvmeCollector, SmartCollector, ZfsCollector};
use crate::config::{CloudConfig, SchedulingConfig};
use crate::discovery::Discovery;
use crate::health::HealthProvider;
use crate::notify::Notifier;
use crate::store::{ScrubHistoryEntry, Store};
use crate::types::{ScheduleKind, TaskType, TestType};
use crate::uplink::{Command, SnapshotPayload, Uplink};
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const DISCOVERY_INTERVAL: Duration = Duration::from_secs(6 * 3600);
const PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 3600);
const SCHEDULE_POLL_INTERVAL: Duration = Duration::from_secs(3600);
const FALLBACK_INTERVAL: Duration = Duration::from_secs(3600);
/// CRON schedules wake the loop at this coarse granularity; the body decides
/// whether anything is actually due
const CRON_WAKE: Duration = Duration::from_secs(60);
/// Snapshot and alert retention
const RETENTION_DAYS: i64 = 90;

pub struct Scheduler {
    store: Arc<Store>,
    scheduling: SchedulingConfig,
    cloud: CloudConfig,
    discovery: Arc<Discovery>,
    smart: Arc<SmartCollector>,
    nvme: Arc<NvmeCollector>,
    zfs: Arc<ZfsCollector>,
    health: Arc<dyn HealthProvider>,
    notifier: Arc<Notifier>,
    uplink: Option<Arc<Uplink>>,
    shutdown: broadcast::Sender<()>,
    command_tx: mpsc::Sender<Command>,
    command_rx: Mutex<Option<mpsc::Receiver<Command>>>,
    dropped_commands: AtomicU64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        scheduling: SchedulingConfig,
        cloud: CloudConfig,
        discovery: Arc<Discovery>,
        smart: Arc<SmartCollector>,
        nvme: Arc<NvmeCollector>,
        zfs: Arc<ZfsCollector>,
        health: Arc<dyn HealthProvider>,
        notifier: Arc<Notifier>,
        uplink: Option<Arc<Uplink>>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(cloud.command_queue_size.max(1));
        Self {
            store,
            scheduling,
            cloud,
            discovery,
            smart,
            nvme,
            zfs,
            health,
            notifier,
            uplink,
            shutdown,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            dropped_commands: AtomicU64::new(0),
        }
    }

    /// Commands dropped because the queue was full
    pub fn dropped_command_count(&self) -> u64 {
        self.dropped_commands.load(Ordering::Relaxed)
    }

    /// One synchronous pass of everything; used by `--once`
    pub async fn run_once(&self) {
        if let Err(e) = self.discovery.run_once().await {
            tracing::warn!(error = %e, "discovery failed");
        }
        let disks = self.store.list_disks().unwrap_or_default();
        let _ = self.smart.collect(&disks).await;
        let _ = self.nvme.collect(&disks).await;
        let _ = self.zfs.collect().await;
        self.dispatch_health().await;
    }

    /// Start all loops; returns their join handles. Shutdown is signalled
    /// through the broadcast sender given at construction.
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.cloud.enabled && self.uplink.is_some() {
            self.poll_and_store_schedules().await;
        }

        if let Err(e) = self.discovery.run_once().await {
            tracing::warn!(error = %e, "initial discovery failed");
        }

        let mut handles = Vec::new();

        handles.push(self.spawn_periodic(None, DISCOVERY_INTERVAL, |s| async move {
            s.discovery_tick().await;
        }));
        handles.push(self.spawn_periodic(
            Some(TaskType::ZfsStatus),
            self.scheduling.zfs_status_interval,
            |s| async move { s.zfs_tick().await },
        ));
        handles.push(self.spawn_periodic(
            Some(TaskType::SmartCollect),
            self.scheduling.smart_collect_interval,
            |s| async move { s.smart_tick().await },
        ));
        handles.push(self.spawn_periodic(
            Some(TaskType::NvmeCollect),
            self.scheduling.smart_collect_interval,
            |s| async move { s.nvme_tick().await },
        ));

        if !self.scheduling.smart_short_interval.is_zero() {
            handles.push(self.spawn_periodic(
                Some(TaskType::SmartShortTest),
                self.scheduling.smart_short_interval,
                |s| async move { s.smart_test_tick(TestType::Short).await },
            ));
        }
        if !self.scheduling.smart_long_interval.is_zero() {
            handles.push(self.spawn_periodic(
                Some(TaskType::SmartLongTest),
                self.scheduling.smart_long_interval,
                |s| async move { s.smart_test_tick(TestType::Long).await },
            ));
        }
        if !self.scheduling.zfs_scrub_interval.is_zero() {
            handles.push(self.spawn_periodic(
                Some(TaskType::ZfsScrub),
                self.scheduling.zfs_scrub_interval,
                |s| async move { s.scrub_tick().await },
            ));
        }

        handles.push(self.spawn_periodic(None, PRUNE_INTERVAL, |s| async move {
            s.prune_tick();
        }));

        if self.cloud.enabled && self.uplink.is_some() {
            handles.push(self.spawn_periodic(None, self.cloud.upload_interval, |s| async move {
                s.upload_tick().await;
            }));
            handles.push(self.spawn_periodic(
                None,
                self.cloud.command_poll_interval,
                |s| async move { s.command_poll_tick().await },
            ));
            handles.push(self.spawn_periodic(None, SCHEDULE_POLL_INTERVAL, |s| async move {
                s.poll_and_store_schedules().await;
            }));

            if let Some(rx) = self.command_rx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let s = Arc::clone(self);
                let shutdown = self.shutdown.subscribe();
                handles.push(tokio::spawn(async move {
                    s.command_processor(rx, shutdown).await;
                }));
            }
        }

        tracing::info!(loops = handles.len(), "scheduler started");
        handles
    }

    fn spawn_periodic<F, Fut>(
        self: &Arc<Self>,
        task: Option<TaskType>,
        config_interval: Duration,
        body: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let s = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                body(Arc::clone(&s)).await;
                let wait = s.effective_interval(task, config_interval);
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        })
    }

    /// Merge the configured cadence with the cloud schedule for a task.
    ///
    /// INTERVAL schedules take the shorter of the two; CRON schedules clamp
    /// the wake to one minute and leave due-ness to the loop body (only the
    /// scrub scheduler computes a true next fire). Absent, disabled or
    /// unparseable schedules fall back to the config interval.
    pub fn effective_interval(&self, task: Option<TaskType>, config_interval: Duration) -> Duration {
        let base = if config_interval.is_zero() {
            FALLBACK_INTERVAL
        } else {
            config_interval
        };
        let Some(task) = task else {
            return base;
        };

        let sched = match self.store.schedule_for_task(task) {
            Ok(Some(sched)) => sched,
            Ok(None) => return base,
            Err(e) => {
                tracing::warn!(task = task.as_str(), error = %e, "schedule lookup failed");
                return base;
            }
        };

        match ScheduleKind::parse(&sched.schedule_type) {
            Some(ScheduleKind::Interval) => match cron::parse_interval(&sched.schedule_value) {
                Ok(cloud) => cloud.min(base),
                Err(e) => {
                    tracing::warn!(
                        task = task.as_str(),
                        value = %sched.schedule_value,
                        error = %e,
                        "failed to parse cloud schedule interval"
                    );
                    base
                }
            },
            Some(ScheduleKind::Cron) => CRON_WAKE.min(base),
            None => base,
        }
    }

    async fn discovery_tick(&self) {
        if let Err(e) = self.discovery.run_once().await {
            tracing::warn!(error = %e, "discovery loop error");
        }
    }

    async fn smart_tick(&self) {
        let disks = self.store.list_disks().unwrap_or_default();
        if let Err(e) = self.smart.collect(&disks).await {
            tracing::warn!(error = %e, "smart loop error");
        }
        self.dispatch_health().await;
    }

    async fn nvme_tick(&self) {
        let disks = self.store.list_disks().unwrap_or_default();
        if let Err(e) = self.nvme.collect(&disks).await {
            tracing::warn!(error = %e, "nvme loop error");
        }
        self.dispatch_health().await;
    }

    async fn zfs_tick(&self) {
        if let Err(e) = self.zfs.collect().await {
            tracing::warn!(error = %e, "zfs loop error");
        }
        self.dispatch_health().await;
    }

    /// Start self-tests on every non-NVMe disk whose last run is older than
    /// the effective interval
    async fn smart_test_tick(&self, test: TestType) {
        let task = match test {
            TestType::Short => TaskType::SmartShortTest,
            TestType::Long => TaskType::SmartLongTest,
        };
        let config_interval = match test {
            TestType::Short => self.scheduling.smart_short_interval,
            TestType::Long => self.scheduling.smart_long_interval,
        };
        let interval_secs = self.effective_interval(Some(task), config_interval).as_secs() as i64;

        let disks = match self.store.list_disks() {
            Ok(disks) => disks,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list disks for smart test scheduler");
                return;
            }
        };

        let now = chrono::Utc::now().timestamp();
        for disk in disks {
            if disk.class == crate::types::DiskClass::Nvme {
                continue;
            }

            let last = match self.store.last_smart_test_time(&disk.id, test) {
                Ok(last) => last,
                Err(e) => {
                    tracing::warn!(disk = %disk.name, error = %e, "failed to get last smart test time");
                    continue;
                }
            };

            if last == 0 || now - last >= interval_secs {
                if self.smart.run_test(&disk, test).await.is_ok() {
                    let _ = self.store.record_smart_test(&disk.id, test);
                    tracing::info!(disk = %disk.name, test = test.as_str(), "scheduled smart test");
                }
            }
        }
    }

    /// Trigger scrubs that are due, per pool.
    ///
    /// A CRON cloud schedule computes the true next fire from the last scrub
    /// time; INTERVAL schedules and plain config use an age check.
    async fn scrub_tick(&self) {
        let pools = match self.store.list_pools() {
            Ok(pools) => pools,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list pools for scrub scheduler");
                return;
            }
        };

        let now = chrono::Utc::now().timestamp();
        let interval_secs = self
            .effective_interval(Some(TaskType::ZfsScrub), self.scheduling.zfs_scrub_interval)
            .as_secs() as i64;

        for pool in pools {
            let last_scrub = match self.store.last_scrub_time(&pool.pool_name) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(pool = %pool.pool_name, error = %e, "failed to get last scrub time");
                    continue;
                }
            };

            let cloud_sched = self.store.schedule_for_task(TaskType::ZfsScrub).ok().flatten();
            let should_run = match cloud_sched {
                Some(sched) if ScheduleKind::parse(&sched.schedule_type) == Some(ScheduleKind::Cron) => {
                    let from = chrono::DateTime::from_timestamp(last_scrub, 0).unwrap_or_default();
                    match cron::next_cron_time(&sched.schedule_value, from) {
                        Ok(next) => now >= next.timestamp(),
                        Err(_) => false,
                    }
                }
                _ => last_scrub == 0 || now - last_scrub >= interval_secs,
            };

            if should_run && self.zfs.trigger_scrub(&pool.pool_name).await.is_ok() {
                let _ = self.store.add_scrub_history(&ScrubHistoryEntry {
                    pool_name: pool.pool_name.clone(),
                    start_time: now,
                    end_time: 0,
                    errors: 0,
                    bytes_processed: 0,
                    notes: "Scheduled scrub".to_string(),
                });
                tracing::info!(pool = %pool.pool_name, "scheduled zfs scrub");
            }
        }
    }

    fn prune_tick(&self) {
        if let Err(e) = self.store.prune_old_snapshots(RETENTION_DAYS) {
            tracing::warn!(error = %e, "prune snapshots failed");
        }
        if let Err(e) = self.store.prune_old_alerts(RETENTION_DAYS) {
            tracing::warn!(error = %e, "prune alerts failed");
        }
    }

    /// Evaluate health, fan alerts into the notifier and the report to the
    /// cloud
    async fn dispatch_health(&self) {
        let report = match self.health.summary().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "health evaluation failed");
                return;
            }
        };

        self.notifier.send(&report.alerts);

        if let Some(uplink) = &self.uplink {
            if let Err(e) = uplink.send_summary(&report).await {
                tracing::warn!(error = %e, "failed to upload health summary");
            }
        }
    }

    /// Assemble and upload the full snapshot payload
    async fn upload_tick(&self) {
        let Some(uplink) = &self.uplink else { return };

        let disks = match self.store.list_disks() {
            Ok(disks) => disks,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list disks for cloud upload");
                return;
            }
        };
        let pools = match self.store.list_pools() {
            Ok(pools) => pools,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list pools for cloud upload");
                return;
            }
        };

        let mut smart_snapshots = Vec::new();
        let mut nvme_snapshots = Vec::new();
        for disk in &disks {
            if disk.class == crate::types::DiskClass::Nvme {
                if let Ok(Some(mut snap)) = self.store.latest_nvme(&disk.id) {
                    snap.raw_output = String::new();
                    nvme_snapshots.push(snap);
                }
            } else if let Ok(Some(mut snap)) = self.store.latest_smart(&disk.id) {
                snap.raw_json = String::new();
                smart_snapshots.push(snap);
            }
        }

        let report = match self.health.summary().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build health report for cloud upload");
                return;
            }
        };

        let payload = SnapshotPayload {
            host_id: String::new(),
            timestamp: chrono::Utc::now().timestamp(),
            disks,
            pools,
            smart_snapshots,
            nvme_snapshots,
            health_report: Some(report),
        };

        match uplink.send_snapshot(payload).await {
            Ok(()) => tracing::debug!("uploaded snapshot to cloud"),
            Err(e) => tracing::warn!(error = %e, "failed to upload snapshot to cloud"),
        }
    }

    async fn command_poll_tick(&self) {
        let Some(uplink) = &self.uplink else { return };

        let commands = match uplink.poll_commands().await {
            Ok(commands) => commands,
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll commands from cloud");
                return;
            }
        };

        for command in commands {
            self.enqueue_command(command);
        }
    }

    /// Non-blocking enqueue; overflow drops the command and counts it
    pub(crate) fn enqueue_command(&self, command: Command) {
        match self.command_tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                self.dropped_commands.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(id = %cmd.id, "command queue full, dropping command");
            }
            Err(mpsc::error::TrySendError::Closed(cmd)) => {
                tracing::warn!(id = %cmd.id, "command queue closed, dropping command");
            }
        }
    }

    /// Single consumer draining the command queue in FIFO order
    async fn command_processor(
        &self,
        mut rx: mpsc::Receiver<Command>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { return };
                    self.process_command(cmd).await;
                }
            }
        }
    }

    async fn process_command(&self, cmd: Command) {
        let (success, error) = self.execute_command(&cmd).await;

        if success {
            tracing::info!(id = %cmd.id, command = %cmd.command_type, "executed remote command");
        } else {
            tracing::warn!(id = %cmd.id, command = %cmd.command_type, error = %error, "remote command failed");
        }

        if let Some(uplink) = &self.uplink {
            if let Err(e) = uplink.acknowledge_command(&cmd.id, success, &error).await {
                tracing::warn!(id = %cmd.id, error = %e, "failed to acknowledge command");
            }
        }
    }

    /// Run one remote command; returns (success, error message)
    pub(crate) async fn execute_command(&self, cmd: &Command) -> (bool, String) {
        match cmd.command_type.as_str() {
            "trigger_scrub" => {
                #[derive(Deserialize)]
                struct ScrubParams {
                    pool_name: String,
                }
                let params: ScrubParams = match serde_json::from_value(cmd.params.clone()) {
                    Ok(params) => params,
                    Err(e) => return (false, format!("invalid params: {e}")),
                };
                match self.zfs.trigger_scrub(&params.pool_name).await {
                    Ok(()) => (true, String::new()),
                    Err(e) => (false, e.to_string()),
                }
            }
            "collect_smart" => {
                let disks = match self.store.list_disks() {
                    Ok(disks) => disks,
                    Err(e) => return (false, e.to_string()),
                };
                match self.smart.collect(&disks).await {
                    Ok(()) => (true, String::new()),
                    Err(e) => (false, e.to_string()),
                }
            }
            "collect_nvme" => {
                let disks = match self.store.list_disks() {
                    Ok(disks) => disks,
                    Err(e) => return (false, e.to_string()),
                };
                match self.nvme.collect(&disks).await {
                    Ok(()) => (true, String::new()),
                    Err(e) => (false, e.to_string()),
                }
            }
            "collect_zfs" => match self.zfs.collect().await {
                Ok(()) => (true, String::new()),
                Err(e) => (false, e.to_string()),
            },
            other => (false, format!("unknown command type: {other}")),
        }
    }

    async fn poll_and_store_schedules(&self) {
        let Some(uplink) = &self.uplink else { return };

        let schedules = match uplink.poll_schedules().await {
            Ok(schedules) => schedules,
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll schedules from cloud");
                return;
            }
        };

        if let Err(e) = self.store.store_schedules(&schedules) {
            tracing::warn!(error = %e, "failed to store schedules");
            return;
        }

        if !schedules.is_empty() {
            tracing::info!(count = schedules.len(), "stored cloud schedules");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::TempDecode;
    use crate::config::{AlertsConfig, NotificationsConfig, StorageConfig};
    use crate::health::StoreBackedProvider;
    use crate::types::CloudSchedule;

    fn build_scheduler(store: Arc<Store>) -> Arc<Scheduler> {
        let (shutdown, _) = broadcast::channel(1);
        let decode = TempDecode::default();
        let scheduling = SchedulingConfig::default();
        let health = Arc::new(StoreBackedProvider::new(
            store.clone(),
            scheduling.clone(),
            AlertsConfig::default(),
        ));
        let notifier = Arc::new(Notifier::new(
            store.clone(),
            NotificationsConfig::default(),
            Duration::from_secs(3600),
            crate::types::Severity::Warning,
        ));
        Arc::new(Scheduler::new(
            store.clone(),
            scheduling,
            CloudConfig::default(),
            Arc::new(Discovery::new(store.clone(), StorageConfig::default(), "true", None)),
            Arc::new(SmartCollector::new(store.clone(), "true", decode)),
            Arc::new(NvmeCollector::new(store.clone(), "true", decode)),
            Arc::new(ZfsCollector::new(store, "true")),
            health,
            notifier,
            None,
            shutdown,
        ))
    }

    fn schedule(task: &str, kind: &str, value: &str, enabled: bool) -> CloudSchedule {
        CloudSchedule {
            id: format!("{task}-{value}"),
            task_type: task.to_string(),
            schedule_type: kind.to_string(),
            schedule_value: value.to_string(),
            enabled,
            updated_at: 0,
        }
    }

    #[test]
    fn test_effective_interval_without_schedule_is_config() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);
        let config = Duration::from_secs(6 * 3600);
        assert_eq!(
            s.effective_interval(Some(TaskType::SmartCollect), config),
            config
        );
    }

    #[test]
    fn test_effective_interval_takes_shorter_cloud_interval() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .store_schedules(&[schedule("SMART_COLLECT", "INTERVAL", "30m", true)])
            .unwrap();
        let s = build_scheduler(store);

        let config = Duration::from_secs(6 * 3600);
        assert_eq!(
            s.effective_interval(Some(TaskType::SmartCollect), config),
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn test_effective_interval_keeps_config_when_cloud_longer() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .store_schedules(&[schedule("SMART_COLLECT", "INTERVAL", "12h", true)])
            .unwrap();
        let s = build_scheduler(store);

        let config = Duration::from_secs(6 * 3600);
        assert_eq!(
            s.effective_interval(Some(TaskType::SmartCollect), config),
            config
        );
    }

    #[test]
    fn test_effective_interval_cron_wakes_every_minute() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .store_schedules(&[schedule("SMART_COLLECT", "CRON", "0 3 * * *", true)])
            .unwrap();
        let s = build_scheduler(store);

        assert_eq!(
            s.effective_interval(Some(TaskType::SmartCollect), Duration::from_secs(6 * 3600)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_effective_interval_ignores_disabled_and_bad_schedules() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .store_schedules(&[
                schedule("SMART_COLLECT", "INTERVAL", "1m", false),
                schedule("ZFS_STATUS", "INTERVAL", "soon", true),
            ])
            .unwrap();
        let s = build_scheduler(store);

        let config = Duration::from_secs(6 * 3600);
        assert_eq!(
            s.effective_interval(Some(TaskType::SmartCollect), config),
            config
        );
        assert_eq!(s.effective_interval(Some(TaskType::ZfsStatus), config), config);
    }

    #[test]
    fn test_effective_interval_zero_config_falls_back() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);
        assert_eq!(
            s.effective_interval(None, Duration::ZERO),
            FALLBACK_INTERVAL
        );
    }

    fn command(id: &str, command_type: &str, params: serde_json::Value) -> Command {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "type": command_type,
            "params": params,
            "created_at": 1_700_000_000,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_execute_trigger_scrub() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);

        // zpool is stubbed with `true`, so the trigger itself succeeds
        let (success, error) = s
            .execute_command(&command(
                "c1",
                "trigger_scrub",
                serde_json::json!({"pool_name": "tank"}),
            ))
            .await;
        assert!(success, "{error}");
        assert!(error.is_empty());
    }

    #[tokio::test]
    async fn test_execute_trigger_scrub_bad_params() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);

        let (success, error) = s
            .execute_command(&command("c1", "trigger_scrub", serde_json::json!({})))
            .await;
        assert!(!success);
        assert!(error.starts_with("invalid params:"));
    }

    #[tokio::test]
    async fn test_execute_unknown_command() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);

        let (success, error) = s
            .execute_command(&command("c9", "frobnicate", serde_json::Value::Null))
            .await;
        assert!(!success);
        assert_eq!(error, "unknown command type: frobnicate");
    }

    #[tokio::test]
    async fn test_execute_collect_smart_with_no_disks() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);

        let (success, error) = s
            .execute_command(&command("c2", "collect_smart", serde_json::Value::Null))
            .await;
        assert!(success, "{error}");
    }

    #[tokio::test]
    async fn test_command_queue_drops_on_overflow() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);

        // Default capacity is 10; the 11th and 12th are dropped
        for i in 0..12 {
            s.enqueue_command(command(&format!("c{i}"), "collect_zfs", serde_json::Value::Null));
        }
        assert_eq!(s.dropped_command_count(), 2);
    }

    #[tokio::test]
    async fn test_commands_processed_in_fifo_order() {
        let store = Arc::new(Store::in_memory().unwrap());
        let s = build_scheduler(store);

        s.enqueue_command(command("a", "collect_zfs", serde_json::Value::Null));
        s.enqueue_command(command("b", "collect_zfs", serde_json::Value::Null));

        let mut rx = s
            .command_rx
            .lock()
            .unwrap()
            .take()
            .expect("receiver available");
        assert_eq!(rx.recv().await.unwrap().id, "a");
        assert_eq!(rx.recv().await.unwrap().id, "b");
    }
}
