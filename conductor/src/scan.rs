//! Snapshot scan: list items from the store and classify them.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument};

use crate::core::snapshot::{Snapshot, SnapshotInput, SnapshotPolicy, build_snapshot};
use crate::io::item_store::{ItemStore, LabelFilter};

/// List PRs, agent-labelled issues and epics, then build the cycle snapshot.
///
/// Any store error aborts the scan; a partial snapshot is never returned.
#[instrument(skip_all)]
pub fn scan_snapshot(store: &dyn ItemStore, policy: &SnapshotPolicy) -> Result<Snapshot> {
    let taken_at = Utc::now();
    let pull_requests = store
        .list_pull_requests()
        .context("list open pull requests")?;
    let tasks = store
        .list_issues(&[LabelFilter::Prefix(policy.labels.agent_prefix.clone())])
        .context("list open tasks")?;
    let epics = store
        .list_issues(&[LabelFilter::Exact(policy.labels.epic.clone())])
        .context("list open epics")?;

    let snapshot = build_snapshot(
        SnapshotInput {
            pull_requests,
            tasks,
            epics,
        },
        policy,
        taken_at,
    );
    info!(
        pull_requests = snapshot.pull_requests.len(),
        open_tasks = snapshot.open_tasks.len(),
        processing_tasks = snapshot.processing_tasks.len(),
        epics_without_tasks = snapshot.epics_without_tasks.len(),
        "snapshot built"
    );
    Ok(snapshot)
}
