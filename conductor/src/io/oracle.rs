//! Decision oracle abstraction and the command-backed adapter.
//!
//! The oracle is advisory and untrusted. Any error returned here makes the
//! decision engine fall back to deterministic selection for the cycle.

use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::enrich::OracleDecision;
use crate::core::summary::OracleSummary;
use crate::io::config::OracleConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptEngine;

const DECISION_SCHEMA: &str = include_str!("../../schemas/oracle_decision.schema.json");

/// Input handed to the oracle for one cycle.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub summary: OracleSummary,
    /// Concurrency budget for the cycle.
    pub max_actions: usize,
}

pub trait DecisionOracle: Send + Sync {
    fn propose(&self, request: &OracleRequest) -> Result<OracleDecision>;
}

/// Oracle that pipes the rendered prompt into a local model command
/// (by default `ollama run mistral:7b --format json`).
pub struct CommandOracle {
    config: OracleConfig,
    prompts: PromptEngine,
}

impl CommandOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        Ok(Self {
            config,
            prompts: PromptEngine::new()?,
        })
    }
}

impl DecisionOracle for CommandOracle {
    #[instrument(
        skip_all,
        fields(program = ?self.config.command.first(), timeout_secs = self.config.timeout_secs)
    )]
    fn propose(&self, request: &OracleRequest) -> Result<OracleDecision> {
        let prompt = self
            .prompts
            .render_oracle(&request.summary, request.max_actions)?;

        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("oracle command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            Duration::from_secs(self.config.timeout_secs),
            self.config.max_response_bytes,
        )
        .context("run oracle command")?;

        if output.timed_out {
            return Err(anyhow!(
                "oracle timed out after {}s",
                self.config.timeout_secs
            ));
        }
        if !output.success() {
            return Err(anyhow!("oracle failed: {}", output.failure_detail()));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "oracle response exceeded {} bytes",
                self.config.max_response_bytes
            ));
        }

        let decision = parse_decision(&output.stdout_text())?;
        debug!(proposed = decision.actions.len(), "oracle responded");
        Ok(decision)
    }
}

/// Parse and schema-check an oracle response.
pub fn parse_decision(raw: &str) -> Result<OracleDecision> {
    static VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
        let schema: Value = serde_json::from_str(DECISION_SCHEMA).map_err(|e| e.to_string())?;
        jsonschema::validator_for(&schema).map_err(|e| e.to_string())
    });
    let validator = VALIDATOR
        .as_ref()
        .map_err(|err| anyhow!("invalid oracle schema: {err}"))?;

    let value: Value = serde_json::from_str(raw.trim()).context("parse oracle response json")?;
    if !validator.is_valid(&value) {
        let messages = validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "oracle response schema validation failed: {}",
            messages.join("; ")
        ));
    }
    serde_json::from_value(value).context("deserialize oracle decision")
}
