//! Item store abstraction and the `gh` CLI adapter.
//!
//! The [`ItemStore`] trait is everything the conductor needs from the issue
//! tracker. Tests use a scripted store; production shells out to `gh` once per
//! tracked repository.

use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::core::types::{IssueRecord, PullRequestRecord};
use crate::io::config::GithubConfig;
use crate::io::process::run_command_with_timeout;

/// Label predicate for issue listing. `agent:*` style patterns match by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFilter {
    Exact(String),
    Prefix(String),
}

impl LabelFilter {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => LabelFilter::Prefix(prefix.to_string()),
            None => LabelFilter::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, labels: &[String]) -> bool {
        match self {
            LabelFilter::Exact(name) => labels.iter().any(|l| l == name),
            LabelFilter::Prefix(prefix) => labels.iter().any(|l| l.starts_with(prefix)),
        }
    }
}

/// An issue matches when any filter matches; no filters match everything.
pub fn matches_any(filters: &[LabelFilter], labels: &[String]) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(labels))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Completed,
    NotPlanned,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::NotPlanned => "not planned",
        }
    }
}

/// Read and mutate tracked items across repositories.
pub trait ItemStore: Send + Sync {
    fn list_pull_requests(&self) -> Result<Vec<PullRequestRecord>>;

    /// List open issues matching any of `filters`.
    fn list_issues(&self, filters: &[LabelFilter]) -> Result<Vec<IssueRecord>>;

    fn add_label(&self, repo: &str, number: u64, label: &str) -> Result<()>;

    fn remove_label(&self, repo: &str, number: u64, label: &str) -> Result<()>;

    /// Create an issue and return its number.
    fn create_issue(&self, repo: &str, issue: &NewIssue) -> Result<u64>;

    fn close_issue(&self, repo: &str, number: u64, reason: CloseReason) -> Result<()>;
}

/// Item store backed by the GitHub CLI.
pub struct GhItemStore {
    config: GithubConfig,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
}

impl GhItemStore {
    pub fn new(config: GithubConfig) -> Self {
        Self { config }
    }

    fn full_name(&self, repo: &str) -> String {
        format!("{}/{}", self.config.org, repo)
    }

    fn gh(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args);
        let output = run_command_with_timeout(
            cmd,
            None,
            Duration::from_secs(self.config.command_timeout_secs),
            self.config.output_limit_bytes,
        )?;
        if output.timed_out {
            return Err(anyhow!(
                "gh {} timed out after {}s",
                args.join(" "),
                self.config.command_timeout_secs
            ));
        }
        if !output.success() {
            return Err(anyhow!(
                "gh {} failed: {}",
                args.join(" "),
                output.failure_detail()
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!("gh {} output exceeded limit", args.join(" ")));
        }
        Ok(output.stdout_text())
    }

    fn pr_list_args(&self, repo: &str) -> Vec<String> {
        vec![
            "pr".to_string(),
            "list".to_string(),
            "--repo".to_string(),
            self.full_name(repo),
            "--state".to_string(),
            "open".to_string(),
            "--limit".to_string(),
            self.config.list_limit.to_string(),
            "--json".to_string(),
            "number,title,labels".to_string(),
        ]
    }

    fn issue_list_args(&self, repo: &str, filters: &[LabelFilter]) -> Vec<String> {
        let mut args = vec![
            "issue".to_string(),
            "list".to_string(),
            "--repo".to_string(),
            self.full_name(repo),
            "--state".to_string(),
            "open".to_string(),
            "--limit".to_string(),
            self.config.list_limit.to_string(),
            "--json".to_string(),
            "number,title,body,labels".to_string(),
        ];
        // `gh --label` is conjunctive, so it can only narrow a single exact filter.
        if let [LabelFilter::Exact(name)] = filters {
            args.push("--label".to_string());
            args.push(name.clone());
        }
        args
    }

    fn issue_create_args(&self, repo: &str, issue: &NewIssue) -> Vec<String> {
        let mut args = vec![
            "issue".to_string(),
            "create".to_string(),
            "--repo".to_string(),
            self.full_name(repo),
            "--title".to_string(),
            issue.title.clone(),
            "--body".to_string(),
            issue.body.clone(),
        ];
        for label in &issue.labels {
            args.push("--label".to_string());
            args.push(label.clone());
        }
        args
    }

    fn issue_edit_args(&self, repo: &str, number: u64, flag: &str, label: &str) -> Vec<String> {
        vec![
            "issue".to_string(),
            "edit".to_string(),
            number.to_string(),
            "--repo".to_string(),
            self.full_name(repo),
            flag.to_string(),
            label.to_string(),
        ]
    }
}

impl ItemStore for GhItemStore {
    #[instrument(skip_all)]
    fn list_pull_requests(&self) -> Result<Vec<PullRequestRecord>> {
        let mut all = Vec::new();
        for repo in &self.config.repos {
            let stdout = self
                .gh(&self.pr_list_args(repo))
                .with_context(|| format!("list pull requests for {repo}"))?;
            let prs = parse_pull_requests(repo, &stdout)
                .with_context(|| format!("parse pull requests for {repo}"))?;
            debug!(repo = %repo, count = prs.len(), "listed pull requests");
            all.extend(prs);
        }
        Ok(all)
    }

    #[instrument(skip_all, fields(filters = ?filters))]
    fn list_issues(&self, filters: &[LabelFilter]) -> Result<Vec<IssueRecord>> {
        let mut all = Vec::new();
        for repo in &self.config.repos {
            let stdout = self
                .gh(&self.issue_list_args(repo, filters))
                .with_context(|| format!("list issues for {repo}"))?;
            let issues = parse_issues(repo, &stdout)
                .with_context(|| format!("parse issues for {repo}"))?;
            all.extend(
                issues
                    .into_iter()
                    .filter(|issue| matches_any(filters, &issue.labels)),
            );
        }
        Ok(all)
    }

    fn add_label(&self, repo: &str, number: u64, label: &str) -> Result<()> {
        self.gh(&self.issue_edit_args(repo, number, "--add-label", label))
            .with_context(|| format!("add label '{label}' to {repo}#{number}"))?;
        debug!(repo, number, label, "label added");
        Ok(())
    }

    fn remove_label(&self, repo: &str, number: u64, label: &str) -> Result<()> {
        self.gh(&self.issue_edit_args(repo, number, "--remove-label", label))
            .with_context(|| format!("remove label '{label}' from {repo}#{number}"))?;
        debug!(repo, number, label, "label removed");
        Ok(())
    }

    fn create_issue(&self, repo: &str, issue: &NewIssue) -> Result<u64> {
        let stdout = self
            .gh(&self.issue_create_args(repo, issue))
            .with_context(|| format!("create issue in {repo}"))?;
        let number = parse_issue_number(&stdout)?;
        info!(repo, number, title = %issue.title, "issue created");
        Ok(number)
    }

    fn close_issue(&self, repo: &str, number: u64, reason: CloseReason) -> Result<()> {
        let args = vec![
            "issue".to_string(),
            "close".to_string(),
            number.to_string(),
            "--repo".to_string(),
            self.full_name(repo),
            "--reason".to_string(),
            reason.as_str().to_string(),
        ];
        self.gh(&args)
            .with_context(|| format!("close {repo}#{number}"))?;
        info!(repo, number, reason = reason.as_str(), "issue closed");
        Ok(())
    }
}

/// Parse `gh pr list --json number,title,labels` output.
pub fn parse_pull_requests(repo: &str, json: &str) -> Result<Vec<PullRequestRecord>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let prs: Vec<GhPullRequest> = serde_json::from_str(json)?;
    Ok(prs
        .into_iter()
        .map(|pr| PullRequestRecord {
            repo: repo.to_string(),
            number: pr.number,
            title: pr.title,
            labels: pr.labels.into_iter().map(|l| l.name).collect(),
        })
        .collect())
}

/// Parse `gh issue list --json number,title,body,labels` output.
pub fn parse_issues(repo: &str, json: &str) -> Result<Vec<IssueRecord>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let issues: Vec<GhIssue> = serde_json::from_str(json)?;
    Ok(issues
        .into_iter()
        .map(|issue| IssueRecord {
            repo: repo.to_string(),
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
        })
        .collect())
}

/// Extract the issue number from the URL `gh issue create` prints.
pub fn parse_issue_number(stdout: &str) -> Result<u64> {
    static ISSUE_URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"/issues/(\d+)\s*$").expect("issue url regex is valid"));
    let caps = ISSUE_URL_RE
        .captures(stdout.trim())
        .ok_or_else(|| anyhow!("no issue url in gh output: {}", stdout.trim()))?;
    caps[1]
        .parse()
        .with_context(|| format!("parse issue number from {}", stdout.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GhItemStore {
        GhItemStore::new(GithubConfig::default())
    }

    #[test]
    fn label_filter_parses_wildcards() {
        assert_eq!(
            LabelFilter::parse("agent:*"),
            LabelFilter::Prefix("agent:".to_string())
        );
        assert_eq!(
            LabelFilter::parse("type:epic"),
            LabelFilter::Exact("type:epic".to_string())
        );
    }

    #[test]
    fn filters_match_any() {
        let labels = vec!["agent:webapp".to_string(), "bug".to_string()];
        let filters = [
            LabelFilter::parse("type:epic"),
            LabelFilter::parse("agent:*"),
        ];
        assert!(matches_any(&filters, &labels));
        assert!(!matches_any(&filters[..1], &labels));
        assert!(matches_any(&[], &labels));
    }

    #[test]
    fn parses_issue_list_with_missing_body() {
        let json = r#"[
            {"number": 55, "title": "Add search", "body": null,
             "labels": [{"name": "agent:webapp"}, {"name": "processing"}]},
            {"number": 56, "title": "No labels"}
        ]"#;

        let issues = parse_issues("webapp", json).expect("parse");

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].repo, "webapp");
        assert_eq!(issues[0].body, "");
        assert_eq!(issues[0].labels, vec!["agent:webapp", "processing"]);
        assert!(issues[1].labels.is_empty());
    }

    #[test]
    fn parses_pull_requests_and_empty_output() {
        let prs = parse_pull_requests(
            "infra",
            r#"[{"number": 12, "title": "Bump", "labels": []}]"#,
        )
        .expect("parse");
        assert_eq!(prs[0].number, 12);
        assert_eq!(prs[0].repo, "infra");
        assert!(parse_pull_requests("infra", "  \n").expect("empty").is_empty());
    }

    #[test]
    fn issue_number_comes_from_created_url() {
        let number =
            parse_issue_number("https://github.com/mentorize-app/webapp/issues/123\n")
                .expect("number");
        assert_eq!(number, 123);
        assert!(parse_issue_number("something went wrong").is_err());
    }

    #[test]
    fn single_exact_filter_is_pushed_down_to_gh() {
        let args = store().issue_list_args("webapp", &[LabelFilter::parse("type:epic")]);
        assert!(args.ends_with(&["--label".to_string(), "type:epic".to_string()]));

        let args = store().issue_list_args("webapp", &[LabelFilter::parse("agent:*")]);
        assert!(!args.contains(&"--label".to_string()));
    }

    #[test]
    fn create_args_repeat_label_flag() {
        let args = store().issue_create_args(
            "webapp",
            &NewIssue {
                title: "Split epic".to_string(),
                body: "Part of #5".to_string(),
                labels: vec!["agent:webapp".to_string(), "type:task".to_string()],
            },
        );
        assert_eq!(args[3], "mentorize-app/webapp");
        assert_eq!(args.iter().filter(|a| *a == "--label").count(), 2);
    }

    #[test]
    fn edit_args_target_issue_in_org() {
        let args = store().issue_edit_args("infra", 7, "--remove-label", "processing");
        assert_eq!(
            args,
            vec![
                "issue",
                "edit",
                "7",
                "--repo",
                "mentorize-app/infra",
                "--remove-label",
                "processing"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn missing_gh_binary_surfaces_as_error() {
        let store = GhItemStore::new(GithubConfig {
            binary: "/nonexistent/gh".to_string(),
            repos: vec!["webapp".to_string()],
            ..GithubConfig::default()
        });
        let err = store.list_pull_requests().unwrap_err();
        assert!(format!("{err:#}").contains("list pull requests for webapp"));
    }
}
