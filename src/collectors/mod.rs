//! Probe invocation and output parsing.
//!
//! Each collector shells out to an external tool with a bounded timeout and
//! feeds the text through a pure parser. Parsing is best-effort and
//! version-tolerant: a field that cannot be understood stays at its default
//! and the raw output is stored regardless.

mod nvme;
mod smart;
mod zfs;

pub use nvme::{parse_nvme_output, NvmeCollector};
pub use smart::{parse_smart_output, SmartCollector};
pub use zfs::{parse_pool_state, parse_scrub_info, scan_in_progress, ZfsCollector};

use crate::error::{WardenError, WardenResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default probe deadline
pub(crate) const COLLECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Self-test triggers get a little longer
pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Scrub trigger returns immediately, keep it tight
pub(crate) const SCRUB_TIMEOUT: Duration = Duration::from_secs(5);

/// Cutoffs for inferring the unit of an unlabelled temperature value.
///
/// Both are heuristics, not facts: a SMART raw value above
/// `smart_fahrenheit_over` is read as Fahrenheit and an NVMe numeric above
/// `nvme_kelvin_over` as Kelvin. The defaults (100 / 200) match what the
/// tools emit in practice but are inherently ambiguous, which is why they
/// are parameters and not constants buried in the parsers.
#[derive(Debug, Clone, Copy)]
pub struct TempDecode {
    pub smart_fahrenheit_over: f64,
    pub nvme_kelvin_over: f64,
}

impl Default for TempDecode {
    fn default() -> Self {
        Self {
            smart_fahrenheit_over: 100.0,
            nvme_kelvin_over: 200.0,
        }
    }
}

/// Run an external tool, capturing combined stdout/stderr.
///
/// Non-zero exit returns the output inside the error so callers can log what
/// the tool said. The timeout kills the child.
pub(crate) async fn run_tool(
    bin: &str,
    args: &[&str],
    timeout: Duration,
) -> WardenResult<String> {
    let child = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| WardenError::Tool(format!("{bin}: {e}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| WardenError::Tool(format!("{bin}: {e}")))?,
        Err(_) => return Err(WardenError::ToolTimeout(timeout.as_secs())),
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(WardenError::Tool(format!(
            "{bin} exited with {}: {}",
            output.status,
            text.trim()
        )));
    }
    Ok(text)
}
