//! Line-based diffs via the system `diff` executable.
//!
//! Exit status contract of `diff`:
//!
//! | Status | Meaning | Result |
//! |--------|---------|--------|
//! | 0 | files identical | [`DiffOutcome::Identical`], artifact removed |
//! | 1 | files differ | [`DiffOutcome::Changed`], stdout kept as the artifact |
//! | other / signal | trouble (missing file, binary input, ...) | [`Error::DiffTool`] |

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::Command;
use tracing::{debug, warn};

use bongo_core::defaults::{COPY_BUFFER_BYTES, TOOL_STDERR_LIMIT_BYTES, TOOL_TIMEOUT_SECS};
use bongo_core::{DiffOutcome, DiffProvider, Error, Result};

use super::read_capped;

const EXIT_IDENTICAL: i32 = 0;
const EXIT_DIFFERENT: i32 = 1;

/// [`DiffProvider`] shelling out to a `diff` executable in unified mode.
#[derive(Debug, Clone)]
pub struct ExternalDiff {
    program: OsString,
    timeout: Duration,
}

impl ExternalDiff {
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

    async fn run(&self, old: &Path, new: &Path, artifact: &Path) -> Result<DiffOutcome> {
        let mut child = Command::new(&self.program)
            .arg("-u")
            .arg(old)
            .arg(new)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::DiffTool(format!(
                    "failed to execute {}: {}",
                    self.program.to_string_lossy(),
                    e
                ))
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("diff stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("diff stderr not captured".to_string()))?;

        let file = fs::File::create(artifact).await?;
        let mut writer = BufWriter::with_capacity(COPY_BUFFER_BYTES, file);

        let (copied, stderr_text) = tokio::join!(
            tokio::io::copy(&mut stdout, &mut writer),
            read_capped(stderr, TOOL_STDERR_LIMIT_BYTES)
        );
        let payload_len = copied?;
        let stderr_text = stderr_text?;
        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        let status = child.wait().await?;
        debug!(
            diff_bin = %self.program.to_string_lossy(),
            exit_status = ?status.code(),
            bytes = payload_len,
            "diff finished"
        );

        match status.code() {
            Some(EXIT_IDENTICAL) => {
                fs::remove_file(artifact).await?;
                Ok(DiffOutcome::Identical)
            }
            Some(EXIT_DIFFERENT) => Ok(DiffOutcome::Changed { payload_len }),
            _ => {
                let _ = fs::remove_file(artifact).await;
                Err(Error::DiffTool(format!(
                    "{} exited with {}: {}",
                    self.program.to_string_lossy(),
                    status,
                    stderr_text.trim()
                )))
            }
        }
    }
}

#[async_trait]
impl DiffProvider for ExternalDiff {
    async fn diff(&self, old: &Path, new: &Path, artifact: &Path) -> Result<DiffOutcome> {
        match tokio::time::timeout(self.timeout, self.run(old, new, artifact)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                let _ = fs::remove_file(artifact).await;
                Err(e)
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "diff timed out");
                let _ = fs::remove_file(artifact).await;
                Err(Error::DiffTool(format!(
                    "{} timed out after {}s",
                    self.program.to_string_lossy(),
                    self.timeout.as_secs()
                )))
            }
        }
    }

    fn name(&self) -> &str {
        "external_diff"
    }
}
