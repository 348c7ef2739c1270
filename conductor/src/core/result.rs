//! Action results and the keyed sink workers report into.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::types::{Action, ActionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// Outcome of one dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub action: Action,
    pub status: ActionStatus,
    /// Attempts actually made (0 if the action never reached the executor).
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timed_out: bool,
}

impl ActionResult {
    pub fn success(action: Action, attempts: u32, payload: Value) -> Self {
        Self {
            action,
            status: ActionStatus::Success,
            attempts,
            payload: Some(payload),
            error: None,
            timed_out: false,
        }
    }

    pub fn failed(
        action: Action,
        attempts: u32,
        error: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            action,
            status: ActionStatus::Failed,
            attempts,
            payload,
            error: Some(error.into()),
            timed_out: false,
        }
    }

    pub fn timed_out(action: Action, attempts: u32, timeout: Duration) -> Self {
        Self {
            action,
            status: ActionStatus::Failed,
            attempts,
            payload: None,
            error: Some(format!("timed out after {}s", timeout.as_secs())),
            timed_out: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    pub fn key(&self) -> ActionKey {
        self.action.key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("result for {0} arrived after the sink was finalized")]
    Finalized(ActionKey),
    #[error("result for {0} was already recorded")]
    AlreadyRecorded(ActionKey),
}

#[derive(Debug, Default)]
struct SinkState {
    results: BTreeMap<ActionKey, ActionResult>,
    finalized: bool,
}

/// Concurrency-safe result store keyed by [`ActionKey`].
///
/// The first result recorded for a key wins. Once finalized, every further
/// write is rejected, so a worker that completes after its slot was closed
/// cannot overwrite anything.
#[derive(Debug, Default)]
pub struct ResultSink {
    state: Mutex<SinkState>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: ActionResult) -> Result<(), SinkError> {
        let mut state = self.lock();
        let key = result.key();
        if state.finalized {
            return Err(SinkError::Finalized(key));
        }
        if state.results.contains_key(&key) {
            return Err(SinkError::AlreadyRecorded(key));
        }
        state.results.insert(key, result);
        Ok(())
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.lock().results.contains_key(key)
    }

    /// Close the sink and take every recorded result.
    pub fn finalize(&self) -> BTreeMap<ActionKey, ActionResult> {
        let mut state = self.lock();
        state.finalized = true;
        std::mem::take(&mut state.results)
    }

    // A panicking worker cannot leave the map half-written, so a poisoned lock
    // is still safe to read.
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
