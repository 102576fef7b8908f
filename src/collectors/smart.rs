//! smartctl output collection and parsing

use super::{run_tool, TempDecode, COLLECT_TIMEOUT, TEST_TIMEOUT};
use crate::error::WardenResult;
use crate::store::Store;
use crate::types::{Disk, DiskClass, SmartSnapshot, TestType};
use std::sync::Arc;

/// Collects `smartctl -H -A` telemetry for SATA/SAS devices
pub struct SmartCollector {
    store: Arc<Store>,
    bin: String,
    decode: TempDecode,
}

impl SmartCollector {
    pub fn new(store: Arc<Store>, bin: impl Into<String>, decode: TempDecode) -> Self {
        Self {
            store,
            bin: bin.into(),
            decode,
        }
    }

    /// One collection pass over the given disks; NVMe devices are skipped.
    /// A failing disk drops this cycle's sample and the pass continues.
    pub async fn collect(&self, disks: &[Disk]) -> WardenResult<()> {
        for disk in disks {
            if disk.class == DiskClass::Nvme {
                continue;
            }
            self.collect_disk(disk).await;
        }
        Ok(())
    }

    async fn collect_disk(&self, disk: &Disk) {
        let out = match run_tool(&self.bin, &["-H", "-A", &disk.name], COLLECT_TIMEOUT).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(disk = %disk.name, error = %e, "smart collect failed");
                return;
            }
        };

        let mut snap = parse_smart_output(&out, &self.decode);
        snap.disk_id = disk.id.clone();
        snap.timestamp = chrono::Utc::now().timestamp();
        snap.raw_json = serde_json::to_string(&out).unwrap_or_default();

        if let Err(e) = self.store.add_smart_snapshot(&snap) {
            tracing::warn!(disk = %disk.name, error = %e, "failed to store smart snapshot");
        }
    }

    /// Start a SMART self-test on a disk
    pub async fn run_test(&self, disk: &Disk, test: TestType) -> WardenResult<()> {
        run_tool(&self.bin, &["-t", test.as_str(), &disk.name], TEST_TIMEOUT).await?;
        tracing::info!(disk = %disk.name, test = test.as_str(), "smart test started");
        Ok(())
    }
}

/// Attribute names whose RAW_VALUE (field index 9) feeds a counter
const COUNTER_KEYS: [(&str, fn(&mut SmartSnapshot) -> &mut i64); 7] = [
    ("Reallocated_Sector_Ct", |s| &mut s.reallocated),
    ("Current_Pending_Sector", |s| &mut s.pending),
    ("Offline_Uncorrectable", |s| &mut s.offline_uncorrectable),
    ("UDMA_CRC_Error_Count", |s| &mut s.crc_errors),
    ("Power_On_Hours", |s| &mut s.power_on_hours),
    ("Spin_Retry_Count", |s| &mut s.spin_retry_count),
    ("Load_Cycle_Count", |s| &mut s.load_cycle_count),
];

/// Parse `smartctl -H -A` text into a snapshot (disk id, timestamp and raw
/// text are left for the caller to fill).
pub fn parse_smart_output(out: &str, decode: &TempDecode) -> SmartSnapshot {
    let mut snap = SmartSnapshot {
        health_status: if out.contains("PASSED") {
            "passed".to_string()
        } else if out.to_uppercase().contains("FAILED") {
            "failed".to_string()
        } else {
            "unknown".to_string()
        },
        ..Default::default()
    };

    for line in out.lines() {
        for (key, field) in COUNTER_KEYS {
            if line.contains(key) {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 10 {
                    if let Ok(v) = parts[9].parse::<i64>() {
                        *field(&mut snap) = v;
                    }
                }
            }
        }
    }

    if let Some(temp) = parse_temperature(out, decode) {
        snap.temperature_c = temp;
    }
    snap
}

fn fahrenheit_to_celsius(v: f64) -> f64 {
    (v - 32.0) * 5.0 / 9.0
}

/// Find a temperature in the output.
///
/// The attribute-table form (`194 Temperature_Celsius ... RAW_VALUE`) is
/// tried first; a raw value above the configured cutoff is read as
/// Fahrenheit. Other layouts fall back to unit-suffix scanning.
fn parse_temperature(out: &str, decode: &TempDecode) -> Option<f64> {
    for line in out.lines() {
        let lower = line.to_lowercase();
        if !lower.contains("temperature") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();

        // Attribute table line: RAW_VALUE lives at field index 9
        if fields.len() >= 10
            && (fields[1].to_lowercase().contains("temperature")
                || lower.contains("temperature_celsius"))
        {
            if let Ok(v) = fields[9].parse::<f64>() {
                if v > decode.smart_fahrenheit_over {
                    return Some(fahrenheit_to_celsius(v));
                }
                return Some(v);
            }
        }

        // Fallback: unit-suffixed or unit-adjacent values
        for (i, field) in fields.iter().enumerate() {
            let field_lower = field.to_lowercase();
            let next = fields.get(i + 1).map(|f| f.to_lowercase());

            if field_lower.ends_with('f') && !field_lower.ends_with("of") {
                if let Ok(v) = field[..field.len() - 1].parse::<f64>() {
                    return Some(fahrenheit_to_celsius(v));
                }
            }
            if matches!(next.as_deref(), Some("f") | Some("fahrenheit")) {
                if let Ok(v) = field.parse::<f64>() {
                    return Some(fahrenheit_to_celsius(v));
                }
            }
            if field_lower.ends_with('c')
                && !field_lower.ends_with("nc")
                && !field_lower.ends_with("ic")
            {
                if let Ok(v) = field[..field.len() - 1].parse::<f64>() {
                    return Some(v);
                }
            }
            if matches!(next.as_deref(), Some("c") | Some("celsius")) {
                if let Ok(v) = field.parse::<f64>() {
                    return Some(v);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRIBUTE_FIXTURE: &str = "\
smartctl 7.3 2022-02-28 r5338 [x86_64-linux-6.1.0] (local build)
=== START OF READ SMART DATA SECTION ===
SMART overall-health self-assessment test result: PASSED

SMART Attributes Data Structure revision number: 16
ID# ATTRIBUTE_NAME          FLAG     VALUE WORST THRESH TYPE      UPDATED  WHEN_FAILED RAW_VALUE
  5 Reallocated_Sector_Ct   0x0033   100   100   005    Pre-fail  Always       -       12
  9 Power_On_Hours          0x0032   095   095   000    Old_age   Always       -       40123
 10 Spin_Retry_Count        0x0033   100   100   051    Pre-fail  Always       -       3
193 Load_Cycle_Count        0x0032   099   099   000    Old_age   Always       -       8219
194 Temperature_Celsius     0x0002   026   026   000    Old_age   Always       -       49 (Min/Max 19/59)
197 Current_Pending_Sector  0x0012   100   100   000    Old_age   Always       -       7
198 Offline_Uncorrectable   0x0010   100   100   000    Old_age   Offline      -       2
199 UDMA_CRC_Error_Count    0x003e   200   200   000    Old_age   Always       -       15
";

    #[test]
    fn test_parse_attribute_table() {
        let snap = parse_smart_output(ATTRIBUTE_FIXTURE, &TempDecode::default());
        assert_eq!(snap.health_status, "passed");
        assert_eq!(snap.reallocated, 12);
        assert_eq!(snap.pending, 7);
        assert_eq!(snap.offline_uncorrectable, 2);
        assert_eq!(snap.crc_errors, 15);
        assert_eq!(snap.power_on_hours, 40123);
        assert_eq!(snap.spin_retry_count, 3);
        assert_eq!(snap.load_cycle_count, 8219);
        assert_eq!(snap.temperature_c, 49.0);
    }

    #[test]
    fn test_missing_keys_stay_zero() {
        let out = "SMART overall-health self-assessment test result: PASSED\n";
        let snap = parse_smart_output(out, &TempDecode::default());
        assert_eq!(snap.reallocated, 0);
        assert_eq!(snap.pending, 0);
        assert_eq!(snap.temperature_c, 0.0);
    }

    #[test]
    fn test_health_failed_and_unknown() {
        let failed = parse_smart_output(
            "SMART overall-health self-assessment test result: FAILED!\n",
            &TempDecode::default(),
        );
        assert_eq!(failed.health_status, "failed");

        let unknown = parse_smart_output("no health line here\n", &TempDecode::default());
        assert_eq!(unknown.health_status, "unknown");
    }

    #[test]
    fn test_attribute_line_with_too_few_fields_ignored() {
        let out = "197 Current_Pending_Sector 5\n";
        let snap = parse_smart_output(out, &TempDecode::default());
        assert_eq!(snap.pending, 0);
    }

    #[test]
    fn test_temperature_raw_above_cutoff_read_as_fahrenheit() {
        let out = "194 Temperature_Celsius 0x0002 026 026 000 Old_age Always - 122\n";
        let snap = parse_smart_output(out, &TempDecode::default());
        assert!((snap.temperature_c - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_temperature_unit_suffix_fallback() {
        let decode = TempDecode::default();
        assert_eq!(parse_temperature("Current Drive Temperature: 38 C", &decode), Some(38.0));
        let f = parse_temperature("Drive Temperature: 98.6 Fahrenheit", &decode).unwrap();
        assert!((f - 37.0).abs() < 0.01);
    }

    #[test]
    fn test_temperature_cutoff_is_configurable() {
        let decode = TempDecode {
            smart_fahrenheit_over: 150.0,
            ..Default::default()
        };
        let out = "194 Temperature_Celsius 0x0002 026 026 000 Old_age Always - 122\n";
        let snap = parse_smart_output(out, &decode);
        assert_eq!(snap.temperature_c, 122.0);
    }
}
