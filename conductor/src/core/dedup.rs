//! Per-cycle claim set for action identities.

use std::collections::HashSet;

use tracing::debug;

use crate::core::types::ActionKey;

/// Keys claimed during one cycle. Create a fresh tracker per cycle; it is never
/// persisted.
#[derive(Debug, Default)]
pub struct DedupTracker {
    claimed: HashSet<ActionKey>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `false` if it was already claimed this cycle.
    pub fn claim(&mut self, key: &ActionKey) -> bool {
        if self.claimed.contains(key) {
            debug!(%key, "action already claimed this cycle");
            return false;
        }
        self.claimed.insert(key.clone());
        true
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.claimed.contains(key)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    pub fn clear(&mut self) {
        self.claimed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ActionKind;

    fn key(kind: ActionKind, number: u64) -> ActionKey {
        ActionKey {
            kind,
            repo: "webapp".to_string(),
            number,
        }
    }

    #[test]
    fn second_claim_of_same_key_is_rejected() {
        let mut tracker = DedupTracker::new();
        assert!(tracker.claim(&key(ActionKind::Review, 12)));
        assert!(!tracker.claim(&key(ActionKind::Review, 12)));
        assert!(tracker.contains(&key(ActionKind::Review, 12)));
        assert!(!tracker.contains(&key(ActionKind::Review, 13)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn kind_is_part_of_the_identity() {
        let mut tracker = DedupTracker::new();
        assert!(tracker.claim(&key(ActionKind::Implement, 60)));
        assert!(tracker.claim(&key(ActionKind::Monitor, 60)));
    }

    #[test]
    fn clear_releases_all_claims() {
        let mut tracker = DedupTracker::new();
        tracker.claim(&key(ActionKind::Review, 1));
        tracker.clear();
        assert!(tracker.is_empty());
        assert!(tracker.claim(&key(ActionKind::Review, 1)));
    }
}
