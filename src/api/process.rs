use crate::error::{Result, VideoError};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

const STDERR_TAIL_LINES: usize = 12;

/// Run an external tool to completion and fail on a non-zero exit status.
pub async fn run_tool(mut command: Command, operation: &str) -> Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Executing {}: {:?}", operation, command.as_std());

    let output = command
        .output()
        .await
        .map_err(|e| VideoError::ProcessError(format!("failed to run {}: {}", operation, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::ProcessError(format!(
            "{} exited with {}: {}",
            operation,
            output.status,
            stderr_tail(&stderr)
        )));
    }

    Ok(output)
}

/// ffmpeg is chatty; only the last lines usually matter.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
