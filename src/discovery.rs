//! Block device and ZFS pool discovery.
//!
//! Walks `/sys/block`, classifies each device, resolves a stable
//! `/dev/disk/by-id` identifier and applies the configured include/exclude
//! globs before upserting into the store. With ZFS enabled, pool membership
//! is refreshed from `zpool status` output.

use crate::collectors::{run_tool, COLLECT_TIMEOUT};
use crate::config::StorageConfig;
use crate::debuglog::DebugLog;
use crate::error::WardenResult;
use crate::store::Store;
use crate::types::{Disk, DiskClass, VdevRole};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

static DEV_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(/dev/(?:sd[a-z]+|nvme\d+n\d+|disk/by-id/[^\s]+))").unwrap()
});
static SHORT_DEV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(sd[a-z]+|nvme\d+n\d+)\b").unwrap());

pub struct Discovery {
    store: Arc<Store>,
    cfg: StorageConfig,
    zpool: String,
    sys_block: PathBuf,
    by_id_dir: PathBuf,
    debug: Option<Arc<DebugLog>>,
}

impl Discovery {
    pub fn new(
        store: Arc<Store>,
        cfg: StorageConfig,
        zpool: impl Into<String>,
        debug: Option<Arc<DebugLog>>,
    ) -> Self {
        Self {
            store,
            cfg,
            zpool: zpool.into(),
            sys_block: PathBuf::from("/sys/block"),
            by_id_dir: PathBuf::from("/dev/disk/by-id"),
            debug,
        }
    }

    /// One discovery pass. Succeeds as long as the sysfs walk worked; later
    /// steps log and continue on failure.
    pub async fn run_once(&self) -> WardenResult<()> {
        let disks = self.scan_sys_block()?;
        let disks = filter_devices(disks, &self.cfg.include_devices, &self.cfg.exclude_devices);

        if let Some(debug) = &self.debug {
            debug.record(
                "discovery",
                "scan complete",
                serde_json::json!({ "disks": disks.len() }),
            );
        }

        for disk in &disks {
            if let Err(e) = self.store.upsert_disk(disk) {
                tracing::warn!(disk = %disk.id, error = %e, "failed to upsert disk");
            }
        }

        if self.cfg.zfs_enable {
            if let Err(e) = self.discover_zfs().await {
                tracing::warn!(error = %e, "zfs discovery failed");
            }
        }

        Ok(())
    }

    fn scan_sys_block(&self) -> WardenResult<Vec<Disk>> {
        let mut disks = Vec::new();
        for entry in std::fs::read_dir(&self.sys_block)? {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name().to_string_lossy().into_owned();

            if name.starts_with("loop") || name.starts_with("ram") || name.starts_with("dm-") {
                continue;
            }

            let dev_dir = self.sys_block.join(&name);
            let rotational = read_trim(&dev_dir.join("queue/rotational"));
            let class = classify_device(&name, &rotational);

            disks.push(Disk {
                id: self.by_id_path(&name),
                name: format!("/dev/{name}"),
                class,
                model: read_trim(&dev_dir.join("device/model")),
                serial: read_trim(&dev_dir.join("device/serial")),
                firmware: read_trim(&dev_dir.join("device/rev")),
                size_bytes: read_size_bytes(&dev_dir.join("size")),
            });
        }
        Ok(disks)
    }

    /// Stable identifier: the by-id symlink pointing at this device, or the
    /// plain `/dev/<name>` path when no symlink matches
    fn by_id_path(&self, name: &str) -> String {
        resolve_by_id_in(&self.by_id_dir, name).unwrap_or_else(|| format!("/dev/{name}"))
    }

    async fn discover_zfs(&self) -> WardenResult<()> {
        let out = run_tool(&self.zpool, &["list", "-H", "-o", "name"], COLLECT_TIMEOUT).await?;
        let pools: Vec<String> = out
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect();

        if let Some(debug) = &self.debug {
            debug.record(
                "discovery",
                "pools listed",
                serde_json::json!({ "pools": pools }),
            );
        }

        for pool in &pools {
            if let Err(e) = self.map_pool_devices(pool).await {
                tracing::warn!(pool, error = %e, "failed to map pool devices");
            }
        }
        Ok(())
    }

    async fn map_pool_devices(&self, pool: &str) -> WardenResult<()> {
        let out = run_tool(&self.zpool, &["status", pool], COLLECT_TIMEOUT).await?;

        let mut device_ids = extract_devices_from_status(&out);
        for id in &mut device_ids {
            if let Some(by_id) = lift_to_by_id(&self.by_id_dir, id) {
                *id = by_id;
            }
        }

        let role = classify_vdev_role(&out);

        if !device_ids.is_empty() {
            self.store.upsert_pool_devices(pool, &device_ids, role)?;
            tracing::debug!(pool, devices = device_ids.len(), "mapped pool devices");
        }
        Ok(())
    }
}

fn read_trim(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// The sysfs `size` file counts 512-byte sectors
fn read_size_bytes(path: &Path) -> i64 {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|sectors| sectors * 512)
        .unwrap_or(0)
}

pub(crate) fn classify_device(name: &str, rotational: &str) -> DiskClass {
    if name.starts_with("nvme") {
        DiskClass::Nvme
    } else if rotational.trim() == "1" {
        DiskClass::Hdd
    } else {
        DiskClass::SataSsd
    }
}

/// Exclude globs are applied first; a non-empty include list then requires a
/// match. Patterns are tested against the stable id, the device path and the
/// bare kernel name, so both `/dev/nvme*` and `nvme*` behave as expected.
pub(crate) fn filter_devices(
    disks: Vec<Disk>,
    include: &[String],
    exclude: &[String],
) -> Vec<Disk> {
    let compile = |patterns: &[String]| -> Vec<glob::Pattern> {
        patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect()
    };
    let include = compile(include);
    let exclude = compile(exclude);

    disks
        .into_iter()
        .filter(|disk| {
            let basename = disk.name.strip_prefix("/dev/").unwrap_or(&disk.name);
            let matches = |p: &glob::Pattern| {
                p.matches(&disk.id) || p.matches(&disk.name) || p.matches(basename)
            };
            if exclude.iter().any(matches) {
                return false;
            }
            include.is_empty() || include.iter().any(matches)
        })
        .collect()
}

/// Pull device identifiers out of `zpool status` text: full `/dev/...` paths
/// first, then bare `sdX` / `nvmeXnY` names lifted to `/dev/` form
pub(crate) fn extract_devices_from_status(status: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();

    for m in DEV_PATH.find_iter(status) {
        let path = m.as_str().to_string();
        if seen.insert(path.clone()) {
            ids.push(path);
        }
    }
    for m in SHORT_DEV.find_iter(status) {
        let path = format!("/dev/{}", m.as_str());
        if seen.insert(path.clone()) {
            ids.push(path);
        }
    }
    ids
}

/// Vdev role from the status text; `data` unless a special vdev section is
/// present (substring check, matching what zpool prints)
pub(crate) fn classify_vdev_role(status: &str) -> VdevRole {
    let lower = status.to_lowercase();
    if lower.contains("cache") {
        VdevRole::Cache
    } else if lower.contains("log") {
        VdevRole::Log
    } else if lower.contains("spare") {
        VdevRole::Spare
    } else {
        VdevRole::Data
    }
}

fn lift_to_by_id(by_id_dir: &Path, device_path: &str) -> Option<String> {
    if device_path.contains("/disk/by-id/") {
        return None;
    }
    let name = device_path.strip_prefix("/dev/").unwrap_or(device_path);
    resolve_by_id_in(by_id_dir, name)
}

fn resolve_by_id_in(by_id_dir: &Path, name: &str) -> Option<String> {
    let entries = std::fs::read_dir(by_id_dir).ok()?;
    for entry in entries.flatten() {
        let link = entry.path();
        if let Ok(target) = std::fs::read_link(&link) {
            if target.to_string_lossy().ends_with(&format!("/{name}")) {
                return Some(link.to_string_lossy().into_owned());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(id: &str, name: &str, class: DiskClass) -> Disk {
        Disk {
            id: id.to_string(),
            name: name.to_string(),
            class,
            model: String::new(),
            serial: String::new(),
            firmware: String::new(),
            size_bytes: 0,
        }
    }

    #[test]
    fn test_classify_device() {
        assert_eq!(classify_device("nvme0n1", "0"), DiskClass::Nvme);
        assert_eq!(classify_device("sda", "1\n"), DiskClass::Hdd);
        assert_eq!(classify_device("sda", "0"), DiskClass::SataSsd);
        assert_eq!(classify_device("sdb", ""), DiskClass::SataSsd);
    }

    #[test]
    fn test_filter_exclude_wins() {
        let disks = vec![
            disk("/dev/sda", "/dev/sda", DiskClass::Hdd),
            disk("/dev/nvme0n1", "/dev/nvme0n1", DiskClass::Nvme),
        ];
        // Bare-name pattern, matched via the kernel name
        let kept = filter_devices(disks, &[], &["nvme*".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "/dev/sda");
    }

    #[test]
    fn test_filter_include_requires_match() {
        let disks = vec![
            disk("/dev/disk/by-id/ata-A", "/dev/sda", DiskClass::Hdd),
            disk("/dev/disk/by-id/ata-B", "/dev/sdb", DiskClass::Hdd),
        ];
        let kept = filter_devices(disks, &["/dev/sda".to_string()], &[]);
        assert_eq!(kept.len(), 1);
        // Include matched the device path even though the id is a by-id path
        assert_eq!(kept[0].id, "/dev/disk/by-id/ata-A");
    }

    #[test]
    fn test_filter_empty_lists_keep_everything() {
        let disks = vec![disk("/dev/sda", "/dev/sda", DiskClass::Hdd)];
        assert_eq!(filter_devices(disks, &[], &[]).len(), 1);
    }

    #[test]
    fn test_extract_devices_full_and_short_forms() {
        let status = "\
\tNAME                         STATE     READ WRITE CKSUM
\ttank                         ONLINE       0     0     0
\t  mirror-0                   ONLINE       0     0     0
\t    /dev/disk/by-id/ata-WDC_WD80-XYZ  ONLINE  0 0 0
\t    sdb                      ONLINE       0     0     0
\t    nvme0n1                  ONLINE       0     0     0
";
        let ids = extract_devices_from_status(status);
        assert_eq!(
            ids,
            vec![
                "/dev/disk/by-id/ata-WDC_WD80-XYZ",
                "/dev/sdb",
                "/dev/nvme0n1"
            ]
        );
    }

    #[test]
    fn test_extract_devices_deduplicates() {
        let status = "/dev/sda\nsda\n/dev/sda\n";
        assert_eq!(extract_devices_from_status(status), vec!["/dev/sda"]);
    }

    #[test]
    fn test_classify_vdev_role() {
        assert_eq!(classify_vdev_role("\tcache\n\t  sdc ONLINE\n"), VdevRole::Cache);
        assert_eq!(classify_vdev_role("\tlogs\n\t  sdd ONLINE\n"), VdevRole::Log);
        assert_eq!(classify_vdev_role("\tspares\n\t  sde AVAIL\n"), VdevRole::Spare);
        assert_eq!(classify_vdev_role("\t  sda ONLINE\n"), VdevRole::Data);
    }

    #[test]
    fn test_resolve_by_id_via_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let by_id = dir.path().join("by-id");
        std::fs::create_dir(&by_id).unwrap();
        let dev = dir.path().join("sda");
        std::fs::write(&dev, b"").unwrap();
        std::os::unix::fs::symlink(&dev, by_id.join("ata-TEST_DISK-S123")).unwrap();

        let resolved = resolve_by_id_in(&by_id, "sda").unwrap();
        assert!(resolved.ends_with("ata-TEST_DISK-S123"));
        assert!(resolve_by_id_in(&by_id, "sdb").is_none());
    }
}
