//! Task executor: bounded fan-out of actions with retry, timeout and hooks.
//!
//! One worker thread runs per action. Workers record into a shared
//! [`ResultSink`] and report their key over a channel; the control thread
//! waits on that channel until every action has a result or its deadline
//! passed. A worker that outlives its deadline is abandoned, and its late
//! result is rejected by the finalized sink.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::result::{ActionResult, ResultSink, SinkError};
use crate::core::types::{Action, ActionKey, ActionKind};
use crate::io::executor::{ExecOutcome, ExecRequest, Executor};
use crate::io::item_store::ItemStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl RetryPolicy {
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Longest time a fully retried action can take.
    pub fn worst_case(&self, attempt_timeout: Duration) -> Duration {
        let attempts = self.attempts();
        attempt_timeout * attempts + self.delay * (attempts - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub retry: RetryPolicy,
    pub action_timeout: Duration,
    pub monitor_timeout: Duration,
    /// Extra time granted to the before/after hooks of one action.
    pub hook_allowance: Duration,
}

impl DispatchConfig {
    pub fn timeout_for(&self, action: &Action) -> Duration {
        match action.kind() {
            ActionKind::Monitor => self.monitor_timeout,
            _ => self.action_timeout,
        }
    }

    fn deadline_budget(&self, action: &Action) -> Duration {
        self.retry.worst_case(self.timeout_for(action)) + self.hook_allowance
    }
}

/// Side effects around one action. Hook failures are logged and never change
/// the action's result or consume an attempt.
pub trait ActionHooks: Send + Sync {
    fn before(&self, action: &Action) -> Result<()>;
    fn after(&self, result: &ActionResult) -> Result<()>;
}

pub struct NoHooks;

impl ActionHooks for NoHooks {
    fn before(&self, _action: &Action) -> Result<()> {
        Ok(())
    }

    fn after(&self, _result: &ActionResult) -> Result<()> {
        Ok(())
    }
}

/// Marks implementation tasks as taken while they run, and flags them for
/// review once the executor reports success.
pub struct LabelHooks {
    store: Arc<dyn ItemStore>,
    processing: String,
    review_requested: String,
}

impl LabelHooks {
    pub fn new(
        store: Arc<dyn ItemStore>,
        processing: impl Into<String>,
        review_requested: impl Into<String>,
    ) -> Self {
        Self {
            store,
            processing: processing.into(),
            review_requested: review_requested.into(),
        }
    }
}

impl ActionHooks for LabelHooks {
    fn before(&self, action: &Action) -> Result<()> {
        if let Action::Implement { repo, number, .. } = action {
            self.store.add_label(repo, *number, &self.processing)?;
        }
        Ok(())
    }

    fn after(&self, result: &ActionResult) -> Result<()> {
        if let Action::Implement { repo, number, .. } = &result.action {
            if result.is_success() {
                self.store.add_label(repo, *number, &self.review_requested)?;
            } else {
                self.store.remove_label(repo, *number, &self.processing)?;
            }
        }
        Ok(())
    }
}

/// Run one action to a final result.
///
/// A timed-out attempt ends the action immediately. Failed completions and
/// executor errors are retried until `policy.max_attempts` attempts were made.
/// `on_attempt` sees the number of each attempt as it starts.
pub fn run_with_retry(
    executor: &dyn Executor,
    action: &Action,
    timeout: Duration,
    policy: &RetryPolicy,
    mut on_attempt: impl FnMut(u32),
) -> ActionResult {
    let max_attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        on_attempt(attempt);
        let request = ExecRequest {
            action: action.clone(),
            timeout,
        };
        let (error, payload) = match executor.execute(&request) {
            Ok(ExecOutcome::TimedOut) => {
                warn!(%action, attempt, "attempt timed out, not retrying");
                return ActionResult::timed_out(action.clone(), attempt, timeout);
            }
            Ok(ExecOutcome::Completed(completion)) if completion.success => {
                return ActionResult::success(action.clone(), attempt, completion.payload);
            }
            Ok(ExecOutcome::Completed(completion)) => (
                completion
                    .error
                    .unwrap_or_else(|| "executor reported failure".to_string()),
                Some(completion.payload),
            ),
            Err(err) => (format!("{err:#}"), None),
        };

        if attempt >= max_attempts {
            warn!(%action, attempts = attempt, %error, "action failed");
            return ActionResult::failed(action.clone(), attempt, error, payload);
        }
        warn!(
            %action,
            attempt,
            max_attempts,
            %error,
            delay_secs = policy.delay.as_secs_f64(),
            "attempt failed, retrying"
        );
        thread::sleep(policy.delay);
    }
}

struct Pending {
    action: Action,
    deadline: Instant,
    timeout: Duration,
    attempts: Arc<AtomicU32>,
}

pub struct TaskExecutor {
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn ActionHooks>,
    config: DispatchConfig,
}

impl TaskExecutor {
    pub fn new(
        executor: Arc<dyn Executor>,
        hooks: Arc<dyn ActionHooks>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            executor,
            hooks,
            config,
        }
    }

    /// Execute every action concurrently and return one result per action, in
    /// input order. Actions must have distinct keys.
    #[instrument(skip_all, fields(actions = actions.len()))]
    pub fn execute_all(&self, actions: Vec<Action>) -> Vec<ActionResult> {
        if actions.is_empty() {
            return Vec::new();
        }

        let sink = Arc::new(ResultSink::new());
        let (done_tx, done_rx) = mpsc::channel::<ActionKey>();
        let mut outstanding: HashMap<ActionKey, Pending> = HashMap::new();
        let dispatched_at = Instant::now();

        for action in &actions {
            let key = action.key();
            let timeout = self.config.timeout_for(action);
            let attempts = Arc::new(AtomicU32::new(0));

            let worker = Worker {
                action: action.clone(),
                timeout,
                retry: self.config.retry,
                executor: Arc::clone(&self.executor),
                hooks: Arc::clone(&self.hooks),
                sink: Arc::clone(&sink),
                attempts: Arc::clone(&attempts),
                done: done_tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("action-{}-{}", action.repo(), action.number()))
                .spawn(move || worker.run());
            if let Err(err) = spawned {
                warn!(%action, error = %err, "failed to spawn worker");
                record(
                    &sink,
                    ActionResult::failed(action.clone(), 0, format!("spawn worker: {err}"), None),
                );
                continue;
            }

            debug!(%action, timeout_secs = timeout.as_secs(), "dispatched");
            outstanding.insert(
                key,
                Pending {
                    action: action.clone(),
                    deadline: dispatched_at + self.config.deadline_budget(action),
                    timeout,
                    attempts,
                },
            );
        }
        drop(done_tx);

        while !outstanding.is_empty() {
            let now = Instant::now();
            let expired: Vec<ActionKey> = outstanding
                .iter()
                .filter(|(_, pending)| pending.deadline <= now)
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                if let Some(pending) = outstanding.remove(&key) {
                    // Zero when the worker never got past its `before` hook.
                    let attempts = pending.attempts.load(Ordering::SeqCst);
                    warn!(
                        action = %pending.action,
                        attempts,
                        "action deadline passed, abandoning worker"
                    );
                    record(
                        &sink,
                        ActionResult::timed_out(pending.action, attempts, pending.timeout),
                    );
                }
            }

            let Some(next_deadline) = outstanding.values().map(|p| p.deadline).min() else {
                break;
            };
            match done_rx.recv_timeout(next_deadline.saturating_duration_since(now)) {
                Ok(key) => {
                    outstanding.remove(&key);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut results = sink.finalize();
        let results: Vec<ActionResult> = actions
            .into_iter()
            .map(|action| {
                results.remove(&action.key()).unwrap_or_else(|| {
                    ActionResult::failed(action, 0, "worker exited without a result", None)
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let elapsed_ms = u64::try_from(dispatched_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            succeeded,
            failed = results.len() - succeeded,
            elapsed_ms,
            "dispatch finished"
        );
        results
    }
}

struct Worker {
    action: Action,
    timeout: Duration,
    retry: RetryPolicy,
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn ActionHooks>,
    sink: Arc<ResultSink>,
    attempts: Arc<AtomicU32>,
    done: mpsc::Sender<ActionKey>,
}

impl Worker {
    fn run(self) {
        let key = self.action.key();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if let Err(err) = self.hooks.before(&self.action) {
                warn!(action = %self.action, error = %format!("{err:#}"), "before hook failed");
            }
            let result = run_with_retry(
                self.executor.as_ref(),
                &self.action,
                self.timeout,
                &self.retry,
                |attempt| self.attempts.store(attempt, Ordering::SeqCst),
            );
            if let Err(err) = self.hooks.after(&result) {
                warn!(action = %self.action, error = %format!("{err:#}"), "after hook failed");
            }
            result
        }));
        let result = outcome.unwrap_or_else(|_| {
            warn!(action = %self.action, "worker panicked");
            ActionResult::failed(
                self.action.clone(),
                self.attempts.load(Ordering::SeqCst),
                "worker panicked",
                None,
            )
        });
        record(&self.sink, result);
        // The control thread may have stopped listening.
        let _ = self.done.send(key);
    }
}

fn record(sink: &ResultSink, result: ActionResult) {
    match sink.record(result) {
        Ok(()) => {}
        Err(SinkError::Finalized(key)) => debug!(%key, "discarding late result"),
        Err(err @ SinkError::AlreadyRecorded(_)) => debug!(error = %err, "keeping first result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::result::ActionStatus;
    use crate::test_support::{Scripted, ScriptedExecutor, ScriptedItemStore, task_item};
    use serde_json::json;

    fn review(number: u64) -> Action {
        Action::Review {
            repo: "webapp".to_string(),
            number,
            title: format!("PR {number}"),
        }
    }

    fn implement(number: u64) -> Action {
        Action::implement(&task_item("webapp", number, "Task"))
    }

    fn config(max_attempts: u32, delay: Duration, timeout: Duration) -> DispatchConfig {
        DispatchConfig {
            retry: RetryPolicy {
                max_attempts,
                delay,
            },
            action_timeout: timeout,
            monitor_timeout: timeout,
            hook_allowance: Duration::ZERO,
        }
    }

    #[test]
    fn worst_case_covers_every_attempt_and_delay() {
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_secs(30),
        };
        assert_eq!(
            policy.worst_case(Duration::from_secs(600)),
            Duration::from_secs(1230)
        );
    }

    #[test]
    fn monitor_uses_its_own_timeout() {
        let cfg = DispatchConfig {
            monitor_timeout: Duration::from_secs(120),
            ..config(2, Duration::ZERO, Duration::from_secs(600))
        };
        let monitor = Action::Monitor {
            repo: "webapp".to_string(),
            number: 61,
            title: "Busy".to_string(),
        };
        assert_eq!(cfg.timeout_for(&monitor), Duration::from_secs(120));
        assert_eq!(cfg.timeout_for(&review(1)), Duration::from_secs(600));
    }

    #[test]
    fn transient_failures_are_retried_with_delay() {
        let executor = ScriptedExecutor::new().script(
            review(12).key(),
            vec![
                Scripted::Fail("rate limited".to_string()),
                Scripted::Succeed(json!({"ok": true})),
            ],
        );
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(40),
        };

        let result =
            run_with_retry(&executor, &review(12), Duration::from_secs(1), &policy, |_| {});

        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
        assert_eq!(result.payload, Some(json!({"ok": true})));
        let times = executor.call_times(&review(12).key());
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_millis(40));
    }

    #[test]
    fn attempt_count_matches_attempts_made_when_retries_run_out() {
        let executor = ScriptedExecutor::new().script(
            review(12).key(),
            vec![
                Scripted::Error("spawn claude".to_string()),
                Scripted::Fail("exit 1".to_string()),
            ],
        );
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::ZERO,
        };

        let result =
            run_with_retry(&executor, &review(12), Duration::from_secs(1), &policy, |_| {});

        assert_eq!(result.status, ActionStatus::Failed);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.error.as_deref(), Some("exit 1"));
        assert!(!result.timed_out);
        assert_eq!(executor.calls().len(), 2);
    }

    #[test]
    fn timed_out_attempt_is_not_retried() {
        let executor = ScriptedExecutor::new().script(review(12).key(), vec![Scripted::TimedOut]);
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::ZERO,
        };

        let result =
            run_with_retry(&executor, &review(12), Duration::from_secs(7), &policy, |_| {});

        assert!(result.timed_out);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error.as_deref(), Some("timed out after 7s"));
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn results_come_back_in_input_order() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .script(review(1).key(), vec![Scripted::Fail("boom".to_string())])
                .with_delay(Duration::from_millis(20)),
        );
        let tasks = TaskExecutor::new(
            executor.clone(),
            Arc::new(NoHooks),
            config(1, Duration::ZERO, Duration::from_secs(5)),
        );

        let results = tasks.execute_all(vec![review(1), review(2), review(3)]);

        let numbers: Vec<u64> = results.iter().map(|r| r.action.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(!results[0].is_success());
        assert!(results[1].is_success());
        assert!(results[2].is_success());
        assert_eq!(executor.calls().len(), 3);
    }

    #[test]
    fn workers_run_concurrently() {
        let executor = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_millis(300)));
        let tasks = TaskExecutor::new(
            executor,
            Arc::new(NoHooks),
            config(1, Duration::ZERO, Duration::from_secs(5)),
        );

        let started = Instant::now();
        let results = tasks.execute_all(vec![review(1), review(2), review(3)]);

        assert!(results.iter().all(ActionResult::is_success));
        assert!(started.elapsed() < Duration::from_millis(850));
    }

    #[test]
    fn barrier_abandons_overdue_worker_and_discards_late_result() {
        // The scripted executor ignores its timeout, like a hung backend.
        let executor = Arc::new(
            ScriptedExecutor::new()
                .script(review(1).key(), vec![Scripted::Succeed(json!({}))])
                .with_delay_for(review(1).key(), Duration::from_millis(1500)),
        );
        let tasks = TaskExecutor::new(
            executor,
            Arc::new(NoHooks),
            config(1, Duration::ZERO, Duration::from_millis(100)),
        );

        let started = Instant::now();
        let results = tasks.execute_all(vec![review(1), review(2)]);

        assert!(started.elapsed() < Duration::from_millis(1200));
        assert!(results[0].timed_out);
        assert_eq!(results[0].attempts, 1);
        assert!(results[1].is_success());
    }

    struct StallingHooks(Duration);

    impl ActionHooks for StallingHooks {
        fn before(&self, _action: &Action) -> Result<()> {
            thread::sleep(self.0);
            Ok(())
        }

        fn after(&self, _result: &ActionResult) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn worker_stuck_in_before_hook_reports_zero_attempts() {
        let executor = Arc::new(ScriptedExecutor::new());
        let tasks = TaskExecutor::new(
            executor.clone(),
            Arc::new(StallingHooks(Duration::from_millis(1500))),
            config(1, Duration::ZERO, Duration::from_millis(100)),
        );

        let results = tasks.execute_all(vec![review(1)]);

        assert!(results[0].timed_out);
        assert_eq!(results[0].attempts, 0);
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn panicking_executor_yields_failed_result() {
        let executor =
            Arc::new(ScriptedExecutor::new().script(review(1).key(), vec![Scripted::Panic]));
        let tasks = TaskExecutor::new(
            executor,
            Arc::new(NoHooks),
            config(2, Duration::ZERO, Duration::from_secs(5)),
        );

        let results = tasks.execute_all(vec![review(1)]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error.as_deref(), Some("worker panicked"));
        assert_eq!(results[0].attempts, 1);
    }

    #[test]
    fn label_hooks_track_implement_lifecycle() {
        let store = Arc::new(ScriptedItemStore::default());
        let executor = Arc::new(
            ScriptedExecutor::new()
                .script(implement(56).key(), vec![Scripted::Fail("no".to_string())]),
        );
        let hooks = LabelHooks::new(store.clone(), "processing", "status:review-requested");
        let tasks = TaskExecutor::new(
            executor,
            Arc::new(hooks),
            config(1, Duration::ZERO, Duration::from_secs(5)),
        );

        let results = tasks.execute_all(vec![implement(55), implement(56), review(12)]);

        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        let mut ops = store.label_ops();
        ops.sort();
        assert_eq!(
            ops,
            vec![
                "+processing webapp#55".to_string(),
                "+processing webapp#56".to_string(),
                "+status:review-requested webapp#55".to_string(),
                "-processing webapp#56".to_string(),
            ]
        );
    }

    #[test]
    fn hook_failure_does_not_consume_an_attempt() {
        let store = Arc::new(ScriptedItemStore::default());
        store.fail_labels("gh: label not found");
        let executor = Arc::new(ScriptedExecutor::new());
        let hooks = LabelHooks::new(store, "processing", "status:review-requested");
        let tasks = TaskExecutor::new(
            executor.clone(),
            Arc::new(hooks),
            config(2, Duration::ZERO, Duration::from_secs(5)),
        );

        let results = tasks.execute_all(vec![implement(55)]);

        assert!(results[0].is_success());
        assert_eq!(results[0].attempts, 1);
        assert_eq!(executor.calls().len(), 1);
    }
}
