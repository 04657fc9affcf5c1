//! Reverse-applies stored diffs with the system `patch`.
//!
//! Invoked as `patch -R -f -s -F 0 <target> <diff>`: reverse, never prompt,
//! silent, and no fuzz. `-f` also stops `patch` from guessing that a diff which
//! fails to reverse was meant to be applied forward. A stored diff must apply
//! exactly; anything else means the history no longer matches the current content.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use bongo_core::defaults::TOOL_TIMEOUT_SECS;
use bongo_core::{Error, PatchProvider, Result};

/// [`PatchProvider`] shelling out to a `patch` executable.
#[derive(Debug, Clone)]
pub struct ExternalPatch {
    program: OsString,
    timeout: Duration,
}

impl ExternalPatch {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            timeout: Duration::from_secs(TOOL_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PatchProvider for ExternalPatch {
    async fn reverse_apply(&self, target: &Path, diff: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-R", "-f", "-s", "-F", "0"])
            .arg(target)
            .arg(diff)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::DiffTool(format!(
                    "{} timed out after {}s",
                    self.program.to_string_lossy(),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                Error::DiffTool(format!(
                    "failed to execute {}: {}",
                    self.program.to_string_lossy(),
                    e
                ))
            })?;

        trace!(diff = %diff.display(), exit_status = ?output.status.code(), "patch finished");

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::DiffChainBroken(format!(
                "{} could not reverse {} (exit {}): {} {}",
                self.program.to_string_lossy(),
                diff.display(),
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "external_patch"
    }
}
