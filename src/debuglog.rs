//! Opt-in NDJSON debug sink
//!
//! An explicit handle threaded into the components that want it; one JSON
//! object per line, appended to a configured file. Write failures are
//! swallowed so a full disk never takes down collection.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub struct DebugLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DebugLog {
    /// Returns `None` when no debug log path is configured
    pub fn open(path: &str) -> Option<Self> {
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: PathBuf::from(path),
            lock: Mutex::new(()),
        })
    }

    /// Append one entry; silent on failure
    pub fn record(&self, component: &str, message: &str, data: serde_json::Value) {
        let entry = serde_json::json!({
            "component": component,
            "message": message,
            "data": data,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });

        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(mut f) = OpenOptions::new().append(true).create(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_when_path_empty() {
        assert!(DebugLog::open("").is_none());
    }

    #[test]
    fn test_writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.ndjson");
        let log = DebugLog::open(path.to_str().unwrap()).unwrap();

        log.record("discovery", "scan complete", serde_json::json!({"disks": 3}));
        log.record("zfs", "pool listed", serde_json::json!({"pool": "tank"}));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["component"], "discovery");
        assert_eq!(first["data"]["disks"], 3);
        assert!(first["timestamp"].as_i64().unwrap() > 0);
    }
}
