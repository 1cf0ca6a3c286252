//! # External Tools
//!
//! Runs the strongbox and kustomize binaries.
//!
//! Every child is spawned with `kill_on_drop` and raced against the invocation's
//! cancellation token, so a cancelled invocation never leaves a child running
//! and reports [`PluginError::Cancelled`] rather than a tool failure.

use crate::error::{IoContext, PluginError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Captured result of a successful tool run
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub duration: Duration,
}

/// Locate a tool binary on PATH (or accept it as-is when it is a path)
pub fn locate(binary: &Path) -> Result<PathBuf> {
    which::which(binary).map_err(|e| PluginError::ExternalTool {
        tool: binary.display().to_string(),
        output: format!("binary not found in PATH: {e}"),
    })
}

/// Run `cmd` to completion unless `cancel` fires first
///
/// A non-zero exit becomes [`PluginError::ExternalTool`] carrying the combined
/// stderr and stdout of the process.
pub async fn run(tool: &str, mut cmd: Command, cancel: &CancellationToken) -> Result<ToolOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if cancel.is_cancelled() {
        return Err(PluginError::Cancelled {
            operation: tool.to_string(),
        });
    }

    let start = Instant::now();
    let child = cmd
        .spawn()
        .io_context(|| format!("unable to start {tool}"))?;

    let output = tokio::select! {
        () = cancel.cancelled() => {
            warn!(tool, elapsed_ms = start.elapsed().as_millis(), "cancelled, killing child process");
            return Err(PluginError::Cancelled { operation: tool.to_string() });
        }
        result = child.wait_with_output() => {
            result.io_context(|| format!("unable to wait for {tool}"))?
        }
    };
    let duration = start.elapsed();

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stdout.trim());
        }
        if combined.is_empty() {
            combined = format!("exit status {}", output.status);
        }
        warn!(tool, status = %output.status, duration_ms = duration.as_millis(), "command failed");
        return Err(PluginError::ExternalTool {
            tool: tool.to_string(),
            output: combined,
        });
    }

    debug!(tool, duration_ms = duration.as_millis(), "command finished");
    Ok(ToolOutput {
        stdout: output.stdout,
        duration,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_run_success_captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf hello");
        let out = run("sh", cmd, &CancellationToken::new()).await.unwrap();
        assert_eq!(out.stdout, b"hello");
    }

    #[tokio::test]
    async fn test_run_failure_carries_combined_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err >&2; exit 3");
        let err = run("sh", cmd, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        let msg = err.to_string();
        assert!(msg.contains("err"));
        assert!(msg.contains("out"));
    }

    #[tokio::test]
    async fn test_run_cancelled_kills_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 30");
        let start = Instant::now();
        let err = run("sleep", cmd, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_run_already_cancelled_does_not_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cmd = Command::new("definitely-not-a-real-binary");
        let err = run("missing", cmd, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_locate_missing_binary() {
        let err = locate(Path::new("definitely-not-a-real-binary-xyz")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
    }
}
