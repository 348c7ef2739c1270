//! Startup checks for the external tools the loop depends on.

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::io::process::run_command_with_timeout;

const PROBE_OUTPUT_LIMIT: usize = 64 * 1024;

/// Verify the executor binary runs and report its version.
///
/// An `mcp list` failure is only a warning: the executor still works without
/// MCP servers, just with less context.
pub fn validate_environment(binary: &str, timeout: Duration) -> Result<String> {
    let mut cmd = Command::new(binary);
    cmd.arg("--version");
    let output = run_command_with_timeout(cmd, None, timeout, PROBE_OUTPUT_LIMIT)
        .map_err(|err| anyhow!("{binary} is not available: {err:#}"))?;
    if output.timed_out {
        return Err(anyhow!("{binary} --version timed out"));
    }
    if !output.success() {
        return Err(anyhow!(
            "{binary} --version failed: {}",
            output.failure_detail()
        ));
    }
    let version = output.stdout_text();
    info!(%binary, %version, "executor available");

    let mut cmd = Command::new(binary);
    cmd.args(["mcp", "list"]);
    match run_command_with_timeout(cmd, None, timeout, PROBE_OUTPUT_LIMIT) {
        Ok(output) if output.success() => {
            info!(servers = %output.stdout_text(), "mcp servers");
        }
        Ok(output) => warn!(detail = %output.failure_detail(), "mcp servers unavailable"),
        Err(err) => warn!(error = %format!("{err:#}"), "mcp servers unavailable"),
    }

    Ok(version)
}
