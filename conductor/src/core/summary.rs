//! Size-capped snapshot summary handed to the decision oracle.

use serde::Serialize;

use crate::core::snapshot::Snapshot;

pub const MAX_SUMMARY_PULL_REQUESTS: usize = 5;
pub const MAX_SUMMARY_OPEN_TASKS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryPullRequest {
    pub repo: String,
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryTask {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub labels: Vec<String>,
}

/// Identity only: the oracle needs to know these are taken, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRef {
    pub repo: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEpic {
    pub repo: String,
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleSummary {
    pub prs: Vec<SummaryPullRequest>,
    pub open_tasks: Vec<SummaryTask>,
    pub processing_tasks: Vec<SummaryRef>,
    pub epics_without_tasks: Vec<SummaryEpic>,
}

impl OracleSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            prs: snapshot
                .pull_requests
                .iter()
                .take(MAX_SUMMARY_PULL_REQUESTS)
                .map(|pr| SummaryPullRequest {
                    repo: pr.repo.clone(),
                    number: pr.number,
                    title: pr.title.clone(),
                })
                .collect(),
            open_tasks: snapshot
                .open_tasks
                .iter()
                .take(MAX_SUMMARY_OPEN_TASKS)
                .map(|task| SummaryTask {
                    repo: task.repo.clone(),
                    number: task.number,
                    title: task.title.clone(),
                    labels: task.labels.clone(),
                })
                .collect(),
            processing_tasks: snapshot
                .processing_tasks
                .iter()
                .map(|task| SummaryRef {
                    repo: task.repo.clone(),
                    number: task.number,
                })
                .collect(),
            epics_without_tasks: snapshot
                .epics_without_tasks
                .iter()
                .map(|epic| SummaryEpic {
                    repo: epic.repo.clone(),
                    number: epic.number,
                    title: epic.title.clone(),
                })
                .collect(),
        }
    }
}
