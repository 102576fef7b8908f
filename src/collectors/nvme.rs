//! nvme smart-log collection and parsing

use super::{run_tool, TempDecode, COLLECT_TIMEOUT};
use crate::error::WardenResult;
use crate::store::Store;
use crate::types::{CriticalWarningFlags, Disk, DiskClass, NvmeSnapshot};
use std::sync::Arc;

/// Collects `nvme smart-log` telemetry for NVMe devices
pub struct NvmeCollector {
    store: Arc<Store>,
    bin: String,
    decode: TempDecode,
}

impl NvmeCollector {
    pub fn new(store: Arc<Store>, bin: impl Into<String>, decode: TempDecode) -> Self {
        Self {
            store,
            bin: bin.into(),
            decode,
        }
    }

    /// One collection pass; non-NVMe disks are skipped, failures drop the cycle
    pub async fn collect(&self, disks: &[Disk]) -> WardenResult<()> {
        for disk in disks {
            if disk.class != DiskClass::Nvme {
                continue;
            }
            self.collect_disk(disk).await;
        }
        Ok(())
    }

    async fn collect_disk(&self, disk: &Disk) {
        let out = match run_tool(&self.bin, &["smart-log", &disk.name], COLLECT_TIMEOUT).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(disk = %disk.name, error = %e, "nvme collect failed");
                return;
            }
        };

        let mut snap = parse_nvme_output(&out, &self.decode);
        snap.disk_id = disk.id.clone();
        snap.timestamp = chrono::Utc::now().timestamp();
        snap.raw_output = out;

        if let Err(e) = self.store.add_nvme_snapshot(&snap) {
            tracing::warn!(disk = %disk.name, error = %e, "failed to store nvme snapshot");
        }
    }
}

/// Counter labels matched against lower-cased, underscore-normalized lines
const COUNTER_LABELS: [(&str, fn(&mut NvmeSnapshot) -> &mut i64); 6] = [
    ("media errors", |s| &mut s.media_errors),
    ("num err log entries", |s| &mut s.error_log_entries),
    ("unsafe shutdowns", |s| &mut s.unsafe_shutdowns),
    ("power on hours", |s| &mut s.power_on_hours),
    ("data units written", |s| &mut s.data_written_bytes),
    ("data units read", |s| &mut s.data_read_bytes),
];

/// Parse `nvme smart-log` text into a snapshot (disk id, timestamp and raw
/// text are left for the caller to fill).
///
/// Counters come from the last field of their line (thousands separators
/// tolerated); the critical-warning bitfield prefers an explicit hex token.
pub fn parse_nvme_output(out: &str, decode: &TempDecode) -> NvmeSnapshot {
    let mut snap = NvmeSnapshot::default();

    for line in out.lines() {
        // nvme-cli switched between spaces and underscores across versions
        let label_form = line.to_lowercase().replace('_', " ");

        for (label, field) in COUNTER_LABELS {
            if label_form.contains(label) {
                if let Some(last) = line.split_whitespace().last() {
                    let cleaned = last.trim_end_matches('%').replace(',', "");
                    if let Ok(v) = cleaned.parse::<i64>() {
                        *field(&mut snap) = v;
                    }
                }
            }
        }

        if label_form.contains("percentage used") {
            if let Some(last) = line.split_whitespace().last() {
                if let Ok(v) = last.trim_end_matches('%').parse::<f64>() {
                    snap.percent_used = v;
                }
            }
        }

        if label_form.contains("temperature") {
            if let Some(v) = parse_temperature_fields(line, decode) {
                snap.temperature_c = v;
            }
        }
    }

    snap.critical_warnings = parse_critical_warnings(out);
    snap
}

/// Unit-aware temperature extraction: `°C` / `C` / `K` suffixes, an adjacent
/// `Kelvin` token, or a bare number above the Kelvin cutoff.
fn parse_temperature_fields(line: &str, decode: &TempDecode) -> Option<f64> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    for (i, field) in fields.iter().enumerate() {
        let field_lower = field.to_lowercase();

        if let Some(stripped) = field.strip_suffix("°C").or_else(|| field.strip_suffix("°c")) {
            if let Ok(v) = stripped.parse::<f64>() {
                return Some(v);
            }
        }

        if field_lower.ends_with('k')
            && !field_lower.ends_with("ok")
            && !field_lower.contains("kelvin")
        {
            if let Ok(v) = field[..field.len() - 1].parse::<f64>() {
                return Some(v - 273.15);
            }
        }

        if field_lower.ends_with('c') && !field_lower.contains("celsius") && !field.contains('°') {
            if let Ok(v) = field[..field.len() - 1].parse::<f64>() {
                if v > decode.nvme_kelvin_over {
                    return Some(v - 273.15);
                }
                return Some(v);
            }
        }

        if let Ok(v) = field.parse::<f64>() {
            if let Some(next) = fields.get(i + 1) {
                let next_lower = next.to_lowercase();
                if next_lower.contains("kelvin") || next_lower == "k" {
                    return Some(v - 273.15);
                }
            }
            if v > decode.nvme_kelvin_over {
                return Some(v - 273.15);
            }
        }
    }
    None
}

/// Decode the critical-warning bitfield.
///
/// An explicit hex or decimal value on the critical_warning line is
/// authoritative; without one, only unambiguous phrases set a flag.
pub(crate) fn parse_critical_warnings(out: &str) -> CriticalWarningFlags {
    if let Some(bits) = extract_warning_value(out) {
        return CriticalWarningFlags::from_bits(bits);
    }

    let lower = out.to_lowercase();
    if lower.contains("critical_warning") || lower.contains("critical warning") {
        // Line present but unparseable; stay conservative
        return CriticalWarningFlags::default();
    }

    CriticalWarningFlags {
        available_spare_low: lower.contains("available spare")
            && (lower.contains("below") || lower.contains("low"))
            && !lower.contains("available_spare_threshold"),
        temperature_threshold_exceeded: lower.contains("temperature")
            && lower.contains("exceeded")
            && !lower.contains("warning temperature time")
            && !lower.contains("critical composite temperature time"),
        reliability_degraded: lower.contains("reliability") && lower.contains("degraded"),
        read_only: lower.contains("read only") || lower.contains("read-only"),
    }
}

fn extract_warning_value(out: &str) -> Option<i64> {
    for line in out.lines() {
        let lower = line.to_lowercase();
        if !lower.contains("critical_warning") && !lower.contains("critical warning") {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        for field in &fields {
            let f = field.to_lowercase();
            if let Some(hex) = f.strip_prefix("0x") {
                if let Ok(v) = i64::from_str_radix(hex, 16) {
                    return Some(v);
                }
            }
        }
        for (i, field) in fields.iter().enumerate() {
            let after_colon = *field == ":" || field.ends_with(':');
            if after_colon {
                if let Some(next) = fields.get(i + 1) {
                    if let Ok(v) = next.parse::<i64>() {
                        return Some(v);
                    }
                }
            }
        }
    }
    None
}
