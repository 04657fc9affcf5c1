//! External diff and patch tools.
//!
//! Both tools are resolved through `PATH` once at startup; a missing tool is a
//! configuration error for the whole service, never a per-request error.

pub mod diff;
pub mod patch;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

use bongo_core::defaults::{DIFF_BIN, PATCH_BIN, TOOL_TIMEOUT_SECS};
use bongo_core::{Error, Result};

pub use diff::ExternalDiff;
pub use patch::ExternalPatch;

/// Configuration for the external diff and patch executables.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Diff executable name or path.
    pub diff_bin: OsString,
    /// Patch executable name or path.
    pub patch_bin: OsString,
    /// Per-invocation timeout.
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            diff_bin: DIFF_BIN.into(),
            patch_bin: PATCH_BIN.into(),
            timeout: Duration::from_secs(TOOL_TIMEOUT_SECS),
        }
    }
}

impl ToolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DIFF_BIN` | `diff` | Diff executable |
    /// | `PATCH_BIN` | `patch` | Patch executable |
    /// | `TOOL_TIMEOUT_SECS` | `120` | Per-invocation timeout |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let diff_bin = std::env::var_os("DIFF_BIN").unwrap_or(defaults.diff_bin);
        let patch_bin = std::env::var_os("PATCH_BIN").unwrap_or(defaults.patch_bin);
        let timeout = std::env::var("TOOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            diff_bin,
            patch_bin,
            timeout,
        }
    }

    pub fn with_diff_bin(mut self, bin: impl Into<OsString>) -> Self {
        self.diff_bin = bin.into();
        self
    }

    pub fn with_patch_bin(mut self, bin: impl Into<OsString>) -> Self {
        self.patch_bin = bin.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve both executables and return a config pointing at their full paths.
    ///
    /// Fails with [`Error::Config`] naming the first tool that cannot be found.
    pub fn resolve(&self) -> Result<Self> {
        let diff_bin = locate_executable(&self.diff_bin).ok_or_else(|| {
            Error::Config(format!("{} not found", self.diff_bin.to_string_lossy()))
        })?;
        let patch_bin = locate_executable(&self.patch_bin).ok_or_else(|| {
            Error::Config(format!("{} not found", self.patch_bin.to_string_lossy()))
        })?;

        info!(
            diff_bin = %diff_bin.display(),
            patch_bin = %patch_bin.display(),
            "External tools resolved"
        );

        Ok(Self {
            diff_bin: diff_bin.into_os_string(),
            patch_bin: patch_bin.into_os_string(),
            timeout: self.timeout,
        })
    }

    pub fn diff(&self) -> ExternalDiff {
        ExternalDiff::new(&self.diff_bin).with_timeout(self.timeout)
    }

    pub fn patch(&self) -> ExternalPatch {
        ExternalPatch::new(&self.patch_bin).with_timeout(self.timeout)
    }
}

/// Find an executable the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are
/// searched in `PATH`.
pub fn locate_executable(program: &OsStr) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Read at most `limit` bytes from a child stream, then drain the rest.
///
/// Draining keeps the child from blocking on a full pipe.
pub(crate) async fn read_capped<R>(mut reader: R, limit: u64) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut reader).take(limit).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    /// Write an executable shell script into `dir` and return its path.
    pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
