//! Executor abstraction for action dispatch.
//!
//! The [`Executor`] trait decouples dispatch from the agent backend (currently
//! the `claude` CLI). Tests use scripted executors that return predetermined
//! outcomes without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::types::Action;
use crate::io::config::ExecutorConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptEngine;

/// One executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub action: Action,
    /// Upper bound for this attempt.
    pub timeout: Duration,
}

/// Structured completion reported by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecCompletion {
    pub success: bool,
    /// Parsed JSON output, or `{"raw_output": ...}` when it was not JSON.
    pub payload: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Completed(ExecCompletion),
    /// The attempt exceeded `ExecRequest::timeout`.
    TimedOut,
}

/// Abstraction over action execution backends.
///
/// `Err` means the attempt could not run at all (e.g. spawn failure) and is
/// treated like a failed completion.
pub trait Executor: Send + Sync {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome>;
}

/// Executor that runs the `claude` CLI with a rendered prompt.
pub struct ClaudeExecutor {
    config: ExecutorConfig,
    org: String,
    prompts: PromptEngine,
}

impl ClaudeExecutor {
    pub fn new(config: ExecutorConfig, org: impl Into<String>) -> Result<Self> {
        Ok(Self {
            config,
            org: org.into(),
            prompts: PromptEngine::new()?,
        })
    }

    fn workdir(&self, repo: &str) -> Option<PathBuf> {
        let dir = self.config.workspace_root.as_ref()?.join(repo);
        dir.is_dir().then_some(dir)
    }
}

impl Executor for ClaudeExecutor {
    #[instrument(
        skip_all,
        fields(action = %request.action, timeout_secs = request.timeout.as_secs())
    )]
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        let prompt = self
            .prompts
            .render_action(&request.action, &self.org)
            .context("render action prompt")?;

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(&prompt).args(&self.config.args);
        if let Some(dir) = self.workdir(request.action.repo()) {
            debug!(workdir = %dir.display(), "running inside repository checkout");
            cmd.current_dir(dir);
        }

        info!("starting executor");
        let output = run_command_with_timeout(
            cmd,
            None,
            request.timeout,
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.config.binary))?;

        if output.timed_out {
            warn!("executor timed out");
            return Ok(ExecOutcome::TimedOut);
        }

        let payload = parse_payload(&output.stdout_text());
        if output.success() {
            debug!("executor completed successfully");
            return Ok(ExecOutcome::Completed(ExecCompletion {
                success: true,
                payload,
                error: None,
            }));
        }

        let error = output.failure_detail();
        warn!(exit_code = ?output.status.code(), %error, "executor failed");
        Ok(ExecOutcome::Completed(ExecCompletion {
            success: false,
            payload,
            error: Some(error),
        }))
    }
}

/// Parse executor stdout as JSON, keeping non-JSON output verbatim.
pub fn parse_payload(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return json!({});
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| json!({ "raw_output": stdout }))
}
