//! Conductor configuration stored in `conductor.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::snapshot::{LabelScheme, SnapshotPolicy};

/// Conductor configuration (TOML).
///
/// Missing fields default to the values the loop was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConductorConfig {
    /// Pause between cycles, in seconds.
    pub loop_interval_secs: u64,

    /// Maximum actions admitted per cycle; also the concurrency bound.
    pub max_parallel_actions: usize,

    /// Timeout for one executor attempt.
    pub action_timeout_secs: u64,

    /// Timeout for one attempt of a monitor action.
    pub monitor_timeout_secs: u64,

    /// Total attempts per action, including the first.
    pub retry_attempts: u32,

    pub retry_delay_secs: u64,

    /// Tasks numbered below this are never dispatched.
    pub ignore_before_number: u64,

    /// Directory for per-cycle JSON reports. Disabled when unset.
    pub report_dir: Option<PathBuf>,

    pub github: GithubConfig,
    pub labels: LabelConfig,
    pub executor: ExecutorConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    /// `gh` binary to invoke.
    pub binary: String,
    pub org: String,
    pub repos: Vec<String>,
    /// `--limit` passed to list commands.
    pub list_limit: u32,
    pub command_timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            binary: "gh".to_string(),
            org: "mentorize-app".to_string(),
            repos: ["webapp", "infrastructure", "tenant-api", "referential"]
                .into_iter()
                .map(String::from)
                .collect(),
            list_limit: 200,
            command_timeout_secs: 60,
            output_limit_bytes: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LabelConfig {
    pub epic: String,
    pub processing: String,
    /// Prefix of agent ownership labels; tasks are issues carrying one.
    pub agent_prefix: String,
    pub review_requested: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        let scheme = LabelScheme::default();
        Self {
            epic: scheme.epic,
            processing: scheme.processing,
            agent_prefix: scheme.agent_prefix,
            review_requested: "status:review-requested".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub binary: String,
    /// Arguments appended after the prompt.
    pub args: Vec<String>,
    /// Parent directory of local repository checkouts. Actions run inside
    /// `<workspace_root>/<repo>` when that directory exists.
    pub workspace_root: Option<PathBuf>,
    pub output_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            args: ["-p", "--output-format", "json", "--permission-mode", "bypassPermissions"]
                .into_iter()
                .map(String::from)
                .collect(),
            workspace_root: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    /// Command reading the prompt on stdin and printing JSON on stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Responses longer than this are rejected.
    pub max_response_bytes: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: ["ollama", "run", "mistral:7b", "--format", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: 120,
            max_response_bytes: 16_384,
        }
    }
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            loop_interval_secs: 600,
            max_parallel_actions: 3,
            action_timeout_secs: 600,
            monitor_timeout_secs: 120,
            retry_attempts: 2,
            retry_delay_secs: 30,
            ignore_before_number: 50,
            report_dir: None,
            github: GithubConfig::default(),
            labels: LabelConfig::default(),
            executor: ExecutorConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl ConductorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_actions == 0 {
            return Err(anyhow!("max_parallel_actions must be > 0"));
        }
        if self.action_timeout_secs == 0 || self.monitor_timeout_secs == 0 {
            return Err(anyhow!("action timeouts must be > 0"));
        }
        if self.retry_attempts == 0 {
            return Err(anyhow!("retry_attempts must be > 0"));
        }
        if self.github.repos.is_empty() {
            return Err(anyhow!("github.repos must list at least one repository"));
        }
        if self.github.command_timeout_secs == 0 {
            return Err(anyhow!("github.command_timeout_secs must be > 0"));
        }
        if self.executor.binary.trim().is_empty() {
            return Err(anyhow!("executor.binary must be set"));
        }
        if self.oracle.enabled {
            if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
                return Err(anyhow!("oracle.command must be a non-empty array"));
            }
            if self.oracle.timeout_secs == 0 || self.oracle.max_response_bytes == 0 {
                return Err(anyhow!("oracle timeout and response budget must be > 0"));
            }
        }
        Ok(())
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        SnapshotPolicy {
            ignore_before_number: self.ignore_before_number,
            labels: LabelScheme {
                epic: self.labels.epic.clone(),
                processing: self.labels.processing.clone(),
                agent_prefix: self.labels.agent_prefix.clone(),
            },
        }
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ConductorConfig::default()`.
pub fn load_config(path: &Path) -> Result<ConductorConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = ConductorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConductorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ConductorConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("conductor.toml");
        fs::write(
            &path,
            r#"
max_parallel_actions = 2
report_dir = "logs/cycles"

[github]
repos = ["webapp"]

[oracle]
enabled = false
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");

        assert_eq!(cfg.max_parallel_actions, 2);
        assert_eq!(cfg.retry_attempts, 2);
        assert_eq!(cfg.github.repos, vec!["webapp".to_string()]);
        assert_eq!(cfg.github.org, "mentorize-app");
        assert!(!cfg.oracle.enabled);
        assert_eq!(cfg.report_dir, Some(PathBuf::from("logs/cycles")));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("conductor.toml");
        fs::write(&path, "max_parallel_actions = 0\n").expect("write");

        let err = load_config(&path).unwrap_err();

        assert!(format!("{err:#}").contains("max_parallel_actions"));
    }

    #[test]
    fn snapshot_policy_follows_label_config() {
        let cfg = ConductorConfig {
            ignore_before_number: 10,
            labels: LabelConfig {
                processing: "wip".to_string(),
                ..LabelConfig::default()
            },
            ..ConductorConfig::default()
        };
        let policy = cfg.snapshot_policy();
        assert_eq!(policy.ignore_before_number, 10);
        assert_eq!(policy.labels.processing, "wip");
        assert_eq!(policy.labels.epic, "type:epic");
    }
}
