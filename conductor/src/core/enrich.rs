//! Revalidation of oracle proposals against the live snapshot.
//!
//! The oracle is untrusted: it only names a kind and a target. Every field an
//! action carries is recovered from the snapshot, and targets the snapshot does
//! not contain are dropped.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::dedup::DedupTracker;
use crate::core::snapshot::Snapshot;
use crate::core::types::{Action, ActionKind};

/// One action proposed by the oracle, as parsed from its response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProposedAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub repo: String,
    pub number: u64,
    /// Informational only; tiers come from the action kind.
    #[serde(default)]
    pub priority: Option<u8>,
}

/// Parsed oracle response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OracleDecision {
    pub actions: Vec<ProposedAction>,
    /// Free text, logged and otherwise ignored.
    #[serde(default)]
    pub reasoning: String,
}

/// Resolve a proposal to a full action, or `None` if the kind is unknown or the
/// target is not in the snapshot bucket that kind draws from.
pub fn resolve_proposal(proposal: &ProposedAction, snapshot: &Snapshot) -> Option<Action> {
    let kind = ActionKind::from_wire(&proposal.kind)?;
    let (repo, number) = (proposal.repo.as_str(), proposal.number);
    match kind {
        ActionKind::Review => snapshot.find_pull_request(repo, number).map(Action::review),
        ActionKind::Implement => snapshot.find_open_task(repo, number).map(Action::implement),
        ActionKind::Decompose => snapshot.find_epic(repo, number).map(Action::decompose),
        ActionKind::Monitor => snapshot
            .find_processing_task(repo, number)
            .map(Action::monitor),
    }
}

/// Resolve proposals in oracle order, dropping unresolvable and duplicate ones,
/// until `budget` actions are accepted.
pub fn resolve_proposals(
    decision: &OracleDecision,
    snapshot: &Snapshot,
    budget: usize,
    tracker: &mut DedupTracker,
) -> Vec<Action> {
    let mut accepted = Vec::new();
    for proposal in &decision.actions {
        if accepted.len() >= budget {
            break;
        }
        let Some(action) = resolve_proposal(proposal, snapshot) else {
            warn!(
                kind = %proposal.kind,
                repo = %proposal.repo,
                number = proposal.number,
                "dropping oracle proposal not present in snapshot"
            );
            continue;
        };
        if !tracker.claim(&action.key()) {
            debug!(key = %action.key(), "dropping duplicate oracle proposal");
            continue;
        }
        accepted.push(action);
    }
    accepted
}
