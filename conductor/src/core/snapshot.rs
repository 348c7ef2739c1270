//! Snapshot construction: classify raw item-store records into one immutable view.
//!
//! This is the only place that reads raw label strings. Downstream code sees
//! [`ItemStatus`] and [`ItemKind`] instead.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::{IssueRecord, Item, ItemKind, ItemStatus, PullRequestRecord};

/// Label names that carry meaning for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelScheme {
    pub epic: String,
    pub processing: String,
    /// Prefix identifying the owning agent (e.g. `agent:`).
    pub agent_prefix: String,
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self {
            epic: "type:epic".to_string(),
            processing: "processing".to_string(),
            agent_prefix: "agent:".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Tasks numbered below this are legacy noise and never dispatched.
    pub ignore_before_number: u64,
    pub labels: LabelScheme,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            ignore_before_number: 50,
            labels: LabelScheme::default(),
        }
    }
}

/// Raw collections listed from the item store for one cycle.
#[derive(Debug, Clone, Default)]
pub struct SnapshotInput {
    pub pull_requests: Vec<PullRequestRecord>,
    /// Issues carrying an agent label. Epics among them are skipped.
    pub tasks: Vec<IssueRecord>,
    pub epics: Vec<IssueRecord>,
}

/// Point-in-time view of everything one cycle may act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub pull_requests: Vec<Item>,
    pub open_tasks: Vec<Item>,
    pub processing_tasks: Vec<Item>,
    pub epics_without_tasks: Vec<Item>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.pull_requests.is_empty()
            && self.open_tasks.is_empty()
            && self.processing_tasks.is_empty()
            && self.epics_without_tasks.is_empty()
    }

    pub fn find_pull_request(&self, repo: &str, number: u64) -> Option<&Item> {
        self.pull_requests.iter().find(|i| i.matches(repo, number))
    }

    pub fn find_open_task(&self, repo: &str, number: u64) -> Option<&Item> {
        self.open_tasks.iter().find(|i| i.matches(repo, number))
    }

    pub fn find_processing_task(&self, repo: &str, number: u64) -> Option<&Item> {
        self.processing_tasks.iter().find(|i| i.matches(repo, number))
    }

    pub fn find_epic(&self, repo: &str, number: u64) -> Option<&Item> {
        self.epics_without_tasks
            .iter()
            .find(|i| i.matches(repo, number))
    }
}

/// Build a snapshot from raw records. Pure: the same input always yields the same output.
pub fn build_snapshot(
    input: SnapshotInput,
    policy: &SnapshotPolicy,
    taken_at: DateTime<Utc>,
) -> Snapshot {
    let labels = &policy.labels;

    let pull_requests = input
        .pull_requests
        .into_iter()
        .map(|pr| classify_pull_request(pr, labels))
        .collect();

    // Every non-epic task takes part in the epic association scan, including
    // legacy tasks below the floor.
    let all_tasks: Vec<Item> = input
        .tasks
        .into_iter()
        .map(|issue| classify_issue(issue, labels))
        .filter(|item| !item.is_epic())
        .collect();

    let mut open_tasks = Vec::new();
    let mut processing_tasks = Vec::new();
    for task in all_tasks
        .iter()
        .filter(|task| task.number >= policy.ignore_before_number)
    {
        match task.status {
            ItemStatus::Open => open_tasks.push(task.clone()),
            ItemStatus::Processing => processing_tasks.push(task.clone()),
        }
    }

    let epics_without_tasks = input
        .epics
        .into_iter()
        .map(|issue| classify_issue(issue, labels))
        .filter(|epic| epic.is_epic())
        .filter(|epic| !all_tasks.iter().any(|task| references_epic(epic, task)))
        .collect();

    Snapshot {
        taken_at,
        pull_requests,
        open_tasks,
        processing_tasks,
        epics_without_tasks,
    }
}

/// Epic association heuristic: a task belongs to an epic when it lives in the
/// same repository and its title or body contains the epic's `#<number>`
/// literal.
///
/// This is a plain substring match, so `#5` also matches `#55`, and a task
/// that mentions the epic in passing counts as a subtask. Callers accept the
/// false positives; the effect is only that such an epic is not decomposed.
pub fn references_epic(epic: &Item, task: &Item) -> bool {
    if task.repo != epic.repo {
        return false;
    }
    let reference = format!("#{}", epic.number);
    task.title.contains(&reference) || task.body.contains(&reference)
}

fn classify_pull_request(pr: PullRequestRecord, labels: &LabelScheme) -> Item {
    let agent_owner = agent_owner(&pr.labels, labels);
    Item {
        kind: ItemKind::PullRequest,
        repo: pr.repo,
        number: pr.number,
        title: pr.title,
        body: String::new(),
        status: ItemStatus::Open,
        agent_owner,
        labels: pr.labels,
    }
}

fn classify_issue(issue: IssueRecord, labels: &LabelScheme) -> Item {
    let kind = if has_label(&issue.labels, &labels.epic) {
        ItemKind::Epic
    } else {
        ItemKind::Task
    };
    let status = if has_label(&issue.labels, &labels.processing) {
        ItemStatus::Processing
    } else {
        ItemStatus::Open
    };
    let agent_owner = agent_owner(&issue.labels, labels);
    Item {
        kind,
        repo: issue.repo,
        number: issue.number,
        title: issue.title,
        body: issue.body,
        status,
        agent_owner,
        labels: issue.labels,
    }
}

fn has_label(labels: &[String], name: &str) -> bool {
    labels.iter().any(|label| label == name)
}

fn agent_owner(labels: &[String], scheme: &LabelScheme) -> Option<String> {
    labels
        .iter()
        .find(|label| label.starts_with(&scheme.agent_prefix))
        .cloned()
}
