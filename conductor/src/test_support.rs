//! Test-only builders and scripted collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::enrich::OracleDecision;
use crate::core::types::{
    ActionKey, IssueRecord, Item, ItemKind, ItemStatus, PullRequestRecord,
};
use crate::io::executor::{ExecCompletion, ExecOutcome, ExecRequest, Executor};
use crate::io::item_store::{CloseReason, ItemStore, LabelFilter, NewIssue, matches_any};
use crate::io::oracle::{DecisionOracle, OracleRequest};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn pr_record(repo: &str, number: u64, title: &str) -> PullRequestRecord {
    PullRequestRecord {
        repo: repo.to_string(),
        number,
        title: title.to_string(),
        labels: Vec::new(),
    }
}

/// Open task owned by `agent:<repo>`.
pub fn task_record(repo: &str, number: u64, title: &str, body: &str) -> IssueRecord {
    IssueRecord {
        repo: repo.to_string(),
        number,
        title: title.to_string(),
        body: body.to_string(),
        labels: vec![format!("agent:{repo}")],
    }
}

pub fn processing_record(repo: &str, number: u64, title: &str) -> IssueRecord {
    let mut record = task_record(repo, number, title, "");
    record.labels.push("processing".to_string());
    record
}

pub fn epic_record(repo: &str, number: u64, title: &str) -> IssueRecord {
    IssueRecord {
        repo: repo.to_string(),
        number,
        title: title.to_string(),
        body: format!("{title} epic"),
        labels: vec!["type:epic".to_string()],
    }
}

pub fn task_item(repo: &str, number: u64, title: &str) -> Item {
    Item {
        kind: ItemKind::Task,
        repo: repo.to_string(),
        number,
        title: title.to_string(),
        body: format!("{title} body"),
        labels: vec![format!("agent:{repo}")],
        status: ItemStatus::Open,
        agent_owner: Some(format!("agent:{repo}")),
    }
}

/// In-memory item store with recorded label operations.
#[derive(Default)]
pub struct ScriptedItemStore {
    pull_requests: Vec<PullRequestRecord>,
    issues: Vec<IssueRecord>,
    list_error: Mutex<Option<String>>,
    label_error: Mutex<Option<String>>,
    label_ops: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, NewIssue)>>,
    closed: Mutex<Vec<(String, u64, CloseReason)>>,
}

impl ScriptedItemStore {
    pub fn new(pull_requests: Vec<PullRequestRecord>, issues: Vec<IssueRecord>) -> Self {
        Self {
            pull_requests,
            issues,
            ..Self::default()
        }
    }

    /// Make every list call fail with `message`.
    pub fn fail_listing(&self, message: &str) {
        *lock(&self.list_error) = Some(message.to_string());
    }

    pub fn fail_labels(&self, message: &str) {
        *lock(&self.label_error) = Some(message.to_string());
    }

    /// Label operations as `+label repo#n` / `-label repo#n`, in call order.
    pub fn label_ops(&self) -> Vec<String> {
        lock(&self.label_ops).clone()
    }

    pub fn created_issues(&self) -> Vec<(String, NewIssue)> {
        lock(&self.created).clone()
    }

    pub fn closed_issues(&self) -> Vec<(String, u64, CloseReason)> {
        lock(&self.closed).clone()
    }

    fn check_listing(&self) -> Result<()> {
        match lock(&self.list_error).as_ref() {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }

    fn label_op(&self, sign: char, repo: &str, number: u64, label: &str) -> Result<()> {
        if let Some(message) = lock(&self.label_error).as_ref() {
            return Err(anyhow!("{message}"));
        }
        lock(&self.label_ops).push(format!("{sign}{label} {repo}#{number}"));
        Ok(())
    }
}

impl ItemStore for ScriptedItemStore {
    fn list_pull_requests(&self) -> Result<Vec<PullRequestRecord>> {
        self.check_listing()?;
        Ok(self.pull_requests.clone())
    }

    fn list_issues(&self, filters: &[LabelFilter]) -> Result<Vec<IssueRecord>> {
        self.check_listing()?;
        Ok(self
            .issues
            .iter()
            .filter(|issue| matches_any(filters, &issue.labels))
            .cloned()
            .collect())
    }

    fn add_label(&self, repo: &str, number: u64, label: &str) -> Result<()> {
        self.label_op('+', repo, number, label)
    }

    fn remove_label(&self, repo: &str, number: u64, label: &str) -> Result<()> {
        self.label_op('-', repo, number, label)
    }

    fn create_issue(&self, repo: &str, issue: &NewIssue) -> Result<u64> {
        let mut created = lock(&self.created);
        created.push((repo.to_string(), issue.clone()));
        Ok(1000 + created.len() as u64)
    }

    fn close_issue(&self, repo: &str, number: u64, reason: CloseReason) -> Result<()> {
        lock(&self.closed).push((repo.to_string(), number, reason));
        Ok(())
    }
}

/// One scripted executor attempt.
#[derive(Debug, Clone)]
pub enum Scripted {
    Succeed(Value),
    /// Completed with `success: false`.
    Fail(String),
    TimedOut,
    /// The attempt could not run at all.
    Error(String),
    Panic,
}

/// Executor returning scripted outcomes per action key. Keys without a script
/// (or with an exhausted one) succeed with `{}`.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<ActionKey, VecDeque<Scripted>>>,
    delay: Duration,
    delays: HashMap<ActionKey, Duration>,
    calls: Mutex<Vec<(ActionKey, Instant)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, key: ActionKey, outcomes: Vec<Scripted>) -> Self {
        lock(&self.scripts).insert(key, outcomes.into());
        self
    }

    /// Sleep this long in every attempt before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_delay_for(mut self, key: ActionKey, delay: Duration) -> Self {
        self.delays.insert(key, delay);
        self
    }

    /// Keys of every attempt, in call order.
    pub fn calls(&self) -> Vec<ActionKey> {
        lock(&self.calls).iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn call_times(&self, key: &ActionKey) -> Vec<Instant> {
        lock(&self.calls)
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, at)| *at)
            .collect()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        let key = request.action.key();
        lock(&self.calls).push((key.clone(), Instant::now()));
        let next = lock(&self.scripts)
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        let delay = self.delays.get(&key).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        match next.unwrap_or_else(|| Scripted::Succeed(json!({}))) {
            Scripted::Succeed(payload) => Ok(ExecOutcome::Completed(ExecCompletion {
                success: true,
                payload,
                error: None,
            })),
            Scripted::Fail(error) => Ok(ExecOutcome::Completed(ExecCompletion {
                success: false,
                payload: json!({}),
                error: Some(error),
            })),
            Scripted::TimedOut => Ok(ExecOutcome::TimedOut),
            Scripted::Error(message) => Err(anyhow!("{message}")),
            Scripted::Panic => panic!("scripted executor panic for {key}"),
        }
    }
}

/// Oracle returning one fixed answer and recording every request.
#[derive(Clone)]
pub struct ScriptedOracle {
    answer: std::result::Result<OracleDecision, String>,
    requests: Arc<Mutex<Vec<OracleRequest>>>,
}

impl ScriptedOracle {
    pub fn deciding(decision: OracleDecision) -> Self {
        Self {
            answer: Ok(decision),
            requests: Arc::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        lock(&self.requests).clone()
    }
}

impl DecisionOracle for ScriptedOracle {
    fn propose(&self, request: &OracleRequest) -> Result<OracleDecision> {
        lock(&self.requests).push(request.clone());
        self.answer.clone().map_err(|message| anyhow!("{message}"))
    }
}
