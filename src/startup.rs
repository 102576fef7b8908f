//! Startup preflight.
//!
//! Fail-fast checks run before any loop starts: the configured probe
//! binaries must resolve to something executable, and the parent directory
//! of every configured file path is created up front so later appends never
//! fail on a missing directory.

use crate::config::ToolsConfig;
use crate::error::{WardenError, WardenResult};
use std::path::{Path, PathBuf};

/// Verify every configured probe binary resolves
pub fn run_checks(tools: &ToolsConfig) -> WardenResult<()> {
    for bin in [&tools.smartctl, &tools.nvme, &tools.zpool] {
        ensure_binary(bin)?;
    }
    Ok(())
}

fn ensure_binary(name: &str) -> WardenResult<()> {
    if name.is_empty() {
        return Err(WardenError::Config("binary not specified".into()));
    }
    if look_path(name).is_none() {
        return Err(WardenError::Config(format!(
            "required binary not found: {name}"
        )));
    }
    Ok(())
}

/// Resolve a binary the way a shell would: names with a path separator are
/// checked directly, bare names are searched on PATH
fn look_path(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Create the parent directory of every configured file path (or the path
/// itself when it already is a directory). Empty entries are skipped.
pub fn ensure_paths<P: AsRef<str>>(paths: &[P]) -> WardenResult<()> {
    for p in paths {
        let p = p.as_ref();
        if p.is_empty() {
            continue;
        }
        let path = Path::new(p);
        let dir = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or_else(|| Path::new("."))
        };
        if dir.as_os_str().is_empty() {
            continue;
        }
        std::fs::create_dir_all(dir).map_err(|e| {
            WardenError::Config(format!("cannot create dir {}: {e}", dir.display()))
        })?;
    }
    Ok(())
}
