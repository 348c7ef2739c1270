//! Per-cycle report data.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::result::ActionResult;
use crate::core::types::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    /// Nothing was admitted.
    Idle,
    /// Admitted actions were dispatched and every result collected.
    Completed,
    /// Dry run: actions were selected but not dispatched.
    Planned,
    /// The cycle aborted before dispatch completed.
    Failed,
}

/// Everything one cycle decided and observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Actions admitted by the decision engine, in dispatch order.
    pub planned: Vec<Action>,
    /// One result per dispatched action, in the same order as `planned`.
    pub results: Vec<ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleReport {
    pub fn failed(started_at: DateTime<Utc>, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            status: CycleStatus::Failed,
            started_at,
            duration_ms,
            planned: Vec::new(),
            results: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}
