//! Deterministic priority-tier action selection.

use crate::core::dedup::DedupTracker;
use crate::core::snapshot::Snapshot;
use crate::core::types::Action;

/// Select at most `budget` actions from the snapshot.
///
/// Tiers run strictly in order: reviews for open PRs, then implementation of
/// open tasks, then decomposition of task-less epics. Snapshot order is kept
/// within a tier. Candidates whose key is already claimed in `tracker` are
/// skipped; accepted keys are claimed before they are returned. Processing
/// tasks are never selected here.
pub fn select_actions(
    snapshot: &Snapshot,
    budget: usize,
    tracker: &mut DedupTracker,
) -> Vec<Action> {
    baseline_candidates(snapshot)
        .filter(|action| tracker.claim(&action.key()))
        .take(budget)
        .collect()
}

/// All baseline candidates in tier order, lazily.
fn baseline_candidates(snapshot: &Snapshot) -> impl Iterator<Item = Action> + '_ {
    let reviews = snapshot.pull_requests.iter().map(Action::review);
    let implements = snapshot.open_tasks.iter().map(Action::implement);
    let decomposes = snapshot.epics_without_tasks.iter().map(Action::decompose);
    reviews.chain(implements).chain(decomposes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::{SnapshotInput, SnapshotPolicy, build_snapshot};
    use crate::core::types::ActionKind;
    use crate::test_support::{epic_record, pr_record, processing_record, task_record};
    use chrono::{DateTime, Utc};
    use std::collections::HashSet;

    fn snapshot(input: SnapshotInput) -> Snapshot {
        build_snapshot(input, &SnapshotPolicy::default(), DateTime::<Utc>::UNIX_EPOCH)
    }

    fn mixed_input() -> SnapshotInput {
        SnapshotInput {
            pull_requests: vec![
                pr_record("webapp", 12, "PR 12"),
                pr_record("infra", 13, "PR 13"),
            ],
            tasks: vec![
                task_record("webapp", 60, "Task 60", "body 60"),
                task_record("webapp", 61, "Task 61", "body 61"),
                processing_record("webapp", 62, "Busy"),
            ],
            epics: vec![epic_record("infra", 7, "Epic 7")],
        }
    }

    #[test]
    fn example_selects_one_action_per_tier() {
        let input = SnapshotInput {
            pull_requests: vec![pr_record("webapp", 12, "Fix header")],
            tasks: vec![
                task_record("repo", 3, "Legacy", ""),
                task_record("repo", 55, "Add search", "details"),
            ],
            epics: vec![epic_record("repo", 5, "Billing")],
        };
        let mut tracker = DedupTracker::new();

        let actions = select_actions(&snapshot(input), 3, &mut tracker);

        let keys: Vec<(ActionKind, &str, u64)> = actions
            .iter()
            .map(|a| (a.kind(), a.repo(), a.number()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (ActionKind::Review, "webapp", 12),
                (ActionKind::Implement, "repo", 55),
                (ActionKind::Decompose, "repo", 5),
            ]
        );
        assert_eq!(actions[1].body(), Some("details"));
    }

    #[test]
    fn budget_caps_output_and_claims_only_returned_keys() {
        let mut tracker = DedupTracker::new();

        let actions = select_actions(&snapshot(mixed_input()), 3, &mut tracker);

        assert_eq!(actions.len(), 3);
        assert_eq!(tracker.len(), 3);
        assert_eq!(actions[2].kind(), ActionKind::Implement);
        assert_eq!(actions[2].number(), 60);
    }

    #[test]
    fn tiers_are_never_interleaved_for_any_budget() {
        let snap = snapshot(mixed_input());
        for budget in 0..8 {
            let mut tracker = DedupTracker::new();
            let actions = select_actions(&snap, budget, &mut tracker);
            assert!(actions.len() <= budget);
            let priorities: Vec<u8> = actions.iter().map(Action::priority).collect();
            let mut sorted = priorities.clone();
            sorted.sort();
            assert_eq!(priorities, sorted, "budget {budget}");
            let unique: HashSet<_> = actions.iter().map(Action::key).collect();
            assert_eq!(unique.len(), actions.len());
        }
    }

    #[test]
    fn processing_tasks_are_never_selected() {
        let mut tracker = DedupTracker::new();
        let actions = select_actions(&snapshot(mixed_input()), 10, &mut tracker);
        assert!(actions.iter().all(|a| a.kind() != ActionKind::Monitor));
        assert!(actions.iter().all(|a| a.number() != 62));
        assert_eq!(actions.len(), 5);
    }

    #[test]
    fn claimed_keys_are_skipped_and_budget_moves_on() {
        let snap = snapshot(mixed_input());
        let mut tracker = DedupTracker::new();
        tracker.claim(&Action::review(&snap.pull_requests[0]).key());

        let actions = select_actions(&snap, 2, &mut tracker);

        let numbers: Vec<u64> = actions.iter().map(Action::number).collect();
        assert_eq!(numbers, vec![13, 60]);
    }

    #[test]
    fn empty_snapshot_yields_nothing() {
        let mut tracker = DedupTracker::new();
        let actions = select_actions(&snapshot(SnapshotInput::default()), 3, &mut tracker);
        assert!(actions.is_empty());
    }
}
