//! zpool status collection and parsing

use super::{run_tool, COLLECT_TIMEOUT, SCRUB_TIMEOUT};
use crate::error::WardenResult;
use crate::store::Store;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

static SCRUB_WITH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"scan:\s+scrub.*?with\s+(\d+)\s+errors?\s+on\s+(.+)$").unwrap()
});
static SCRUB_ERRORS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"scan:\s+scrub.*?with\s+(\d+)\s+errors?").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collects pool state and scrub history from `zpool`
pub struct ZfsCollector {
    store: Arc<Store>,
    zpool: String,
}

impl ZfsCollector {
    pub fn new(store: Arc<Store>, zpool: impl Into<String>) -> Self {
        Self {
            store,
            zpool: zpool.into(),
        }
    }

    /// Refresh state for every pool; a failing pool drops this cycle only
    pub async fn collect(&self) -> WardenResult<()> {
        let list = match run_tool(&self.zpool, &["list", "-H", "-o", "name"], COLLECT_TIMEOUT).await
        {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, "zpool list failed");
                return Ok(());
            }
        };

        for pool in pool_names(&list) {
            self.collect_pool_status(&pool).await;
        }
        Ok(())
    }

    async fn collect_pool_status(&self, pool: &str) {
        let out = match run_tool(&self.zpool, &["status", pool], COLLECT_TIMEOUT).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(pool, error = %e, "zpool status failed");
                return;
            }
        };

        let state = parse_pool_state(&out);
        let (last_scrub_time, last_scrub_errors) = parse_scrub_info(&out);

        if scan_in_progress(&out) {
            tracing::info!(pool, "scrub or resilver in progress");
        }

        if let Err(e) = self
            .store
            .upsert_pool(pool, &state, last_scrub_time, last_scrub_errors)
        {
            tracing::warn!(pool, error = %e, "failed to upsert pool");
        }
    }

    /// Kick off a scrub; `zpool scrub` returns immediately
    pub async fn trigger_scrub(&self, pool: &str) -> WardenResult<()> {
        run_tool(&self.zpool, &["scrub", pool], SCRUB_TIMEOUT).await?;
        tracing::info!(pool, "zfs scrub started");
        Ok(())
    }

    /// Pool names from `zpool list -H -o name`
    pub async fn list_pools(&self) -> WardenResult<Vec<String>> {
        let out = run_tool(&self.zpool, &["list", "-H", "-o", "name"], COLLECT_TIMEOUT).await?;
        Ok(pool_names(&out))
    }
}

pub(crate) fn pool_names(list_output: &str) -> Vec<String> {
    list_output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// First `state:` line wins; `UNKNOWN` when absent
pub fn parse_pool_state(output: &str) -> String {
    for line in output.lines() {
        if line.trim_start().starts_with("state:") {
            if let Some(state) = line.split_whitespace().nth(1) {
                return state.to_string();
            }
        }
    }
    "UNKNOWN".to_string()
}

/// Extract (last scrub unix time, error count) from the `scan:` line.
///
/// Returns zeros when the pool has no completed scrub. The completion date
/// usually rides on the scan line itself; some zpool versions wrap it onto
/// a following line, which is scanned as a fallback.
pub fn parse_scrub_info(output: &str) -> (i64, i64) {
    let scan_line = match output
        .lines()
        .find(|line| line.to_lowercase().contains("scan:"))
    {
        Some(line) => line,
        None => return (0, 0),
    };

    if let Some(caps) = SCRUB_WITH_DATE.captures(scan_line) {
        let errors = caps[1].parse().unwrap_or(0);
        let date_str = MULTI_SPACE.replace_all(caps[2].trim(), " ");
        let time = parse_scrub_date(&date_str).unwrap_or(0);
        return (time, errors);
    }

    if let Some(caps) = SCRUB_ERRORS_ONLY.captures(scan_line) {
        let errors = caps[1].parse().unwrap_or(0);
        let time = find_scrub_date_nearby(output).unwrap_or(0);
        return (time, errors);
    }

    (0, 0)
}

/// Whether a scrub or resilver is currently running
pub fn scan_in_progress(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("scan: scrub in progress") || lower.contains("scan: resilver in progress")
}

/// Try the date layouts zpool has used across releases
fn parse_scrub_date(date_str: &str) -> Option<i64> {
    let normalized = MULTI_SPACE.replace_all(date_str.trim(), " ");
    let s = normalized.as_ref();

    // "Sun Jul 13 00:24:16 2025" (zpool's usual `date`-style form)
    if let Ok(t) = chrono::NaiveDateTime::parse_from_str(s, "%a %b %e %H:%M:%S %Y") {
        return Some(t.and_utc().timestamp());
    }
    // RFC 1123: "Sun, 13 Jul 2025 00:24:16 GMT"
    if let Ok(t) = chrono::DateTime::parse_from_rfc2822(s) {
        return Some(t.timestamp());
    }
    if let Ok(t) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc().timestamp());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
    }
    // Without the weekday name
    if let Ok(t) = chrono::NaiveDateTime::parse_from_str(s, "%b %e %H:%M:%S %Y") {
        return Some(t.and_utc().timestamp());
    }
    None
}

/// Scan the line after `scan:` (up to two non-empty lines, stopping at the
/// config section) for a wrapped completion date
fn find_scrub_date_nearby(output: &str) -> Option<i64> {
    let lines: Vec<&str> = output.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if !line.contains("scan:") {
            continue;
        }
        if let Some(t) = parse_scrub_date(line) {
            return Some(t);
        }
        for next in lines.iter().skip(i + 1).take(2) {
            let trimmed = next.trim();
            if trimmed.is_empty()
                || trimmed.starts_with("config:")
                || trimmed.starts_with("NAME")
            {
                break;
            }
            if let Some(t) = parse_scrub_date(trimmed) {
                return Some(t);
            }
        }
    }
    None
}
