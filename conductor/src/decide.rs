//! Decision engine: oracle-guided selection with a deterministic fallback.

use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::core::dedup::DedupTracker;
use crate::core::enrich::resolve_proposals;
use crate::core::selector::select_actions;
use crate::core::snapshot::Snapshot;
use crate::core::summary::OracleSummary;
use crate::core::types::Action;
use crate::io::oracle::{DecisionOracle, OracleRequest};

/// Which strategy produced a cycle's actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Oracle,
    Fallback,
}

pub struct DecisionEngine {
    oracle: Option<Box<dyn DecisionOracle>>,
    budget: usize,
}

impl DecisionEngine {
    pub fn new(oracle: Option<Box<dyn DecisionOracle>>, budget: usize) -> Self {
        Self { oracle, budget }
    }

    /// Deterministic selection only.
    pub fn deterministic(budget: usize) -> Self {
        Self::new(None, budget)
    }

    pub fn decide(&self, snapshot: &Snapshot, tracker: &mut DedupTracker) -> Vec<Action> {
        self.decide_with_source(snapshot, tracker).0
    }

    /// Select at most `budget` actions with distinct keys.
    ///
    /// Any oracle error or panic falls back to [`select_actions`] within the same call.
    /// The tracker is only written by the strategy that produces the result.
    #[instrument(skip_all, fields(budget = self.budget))]
    pub fn decide_with_source(
        &self,
        snapshot: &Snapshot,
        tracker: &mut DedupTracker,
    ) -> (Vec<Action>, DecisionSource) {
        if snapshot.is_empty() {
            debug!("snapshot empty, nothing to decide");
            return (Vec::new(), DecisionSource::Fallback);
        }

        if let Some(oracle) = &self.oracle {
            let request = OracleRequest {
                summary: OracleSummary::from_snapshot(snapshot),
                max_actions: self.budget,
            };
            let answer = catch_unwind(AssertUnwindSafe(|| oracle.propose(&request)))
                .unwrap_or_else(|_| Err(anyhow!("oracle panicked")));
            match answer {
                Ok(decision) => {
                    info!(
                        proposed = decision.actions.len(),
                        reasoning = %decision.reasoning,
                        "oracle decision"
                    );
                    let actions = resolve_proposals(&decision, snapshot, self.budget, tracker);
                    return (actions, DecisionSource::Oracle);
                }
                Err(err) => {
                    warn!(
                        error = %format!("{err:#}"),
                        "oracle unavailable, using deterministic selection"
                    );
                }
            }
        }

        let actions = select_actions(snapshot, self.budget, tracker);
        (actions, DecisionSource::Fallback)
    }
}
