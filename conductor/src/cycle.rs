//! Cycle loop: scan, decide, dispatch, report, sleep.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::core::dedup::DedupTracker;
use crate::core::report::{CycleReport, CycleStatus};
use crate::core::snapshot::SnapshotPolicy;
use crate::decide::DecisionEngine;
use crate::dispatch::{DispatchConfig, LabelHooks, RetryPolicy, TaskExecutor};
use crate::io::config::ConductorConfig;
use crate::io::executor::ClaudeExecutor;
use crate::io::item_store::{GhItemStore, ItemStore};
use crate::io::oracle::{CommandOracle, DecisionOracle};
use crate::io::report::write_cycle_report;
use crate::scan::scan_snapshot;

/// Longest single sleep between stop-flag checks.
const STOP_POLL: Duration = Duration::from_millis(250);

pub struct Conductor {
    store: Arc<dyn ItemStore>,
    engine: DecisionEngine,
    executor: TaskExecutor,
    policy: SnapshotPolicy,
    dry_run: bool,
    report_dir: Option<PathBuf>,
}

impl Conductor {
    pub fn new(
        store: Arc<dyn ItemStore>,
        engine: DecisionEngine,
        executor: TaskExecutor,
        policy: SnapshotPolicy,
    ) -> Self {
        Self {
            store,
            engine,
            executor,
            policy,
            dry_run: false,
            report_dir: None,
        }
    }

    /// Select actions but never dispatch them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_report_dir(mut self, report_dir: Option<PathBuf>) -> Self {
        self.report_dir = report_dir;
        self
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &ConductorConfig, dry_run: bool) -> Result<Self> {
        let store: Arc<dyn ItemStore> = Arc::new(GhItemStore::new(config.github.clone()));

        let oracle: Option<Box<dyn DecisionOracle>> = if config.oracle.enabled {
            Some(Box::new(CommandOracle::new(config.oracle.clone())?))
        } else {
            None
        };
        let engine = DecisionEngine::new(oracle, config.max_parallel_actions);

        let executor = Arc::new(ClaudeExecutor::new(
            config.executor.clone(),
            config.github.org.clone(),
        )?);
        let hooks = Arc::new(LabelHooks::new(
            Arc::clone(&store),
            config.labels.processing.clone(),
            config.labels.review_requested.clone(),
        ));
        let dispatch = DispatchConfig {
            retry: RetryPolicy {
                max_attempts: config.retry_attempts,
                delay: Duration::from_secs(config.retry_delay_secs),
            },
            action_timeout: Duration::from_secs(config.action_timeout_secs),
            monitor_timeout: Duration::from_secs(config.monitor_timeout_secs),
            // Up to three label edits per action.
            hook_allowance: Duration::from_secs(config.github.command_timeout_secs) * 3,
        };

        Ok(Self::new(
            store,
            engine,
            TaskExecutor::new(executor, hooks, dispatch),
            config.snapshot_policy(),
        )
        .with_dry_run(dry_run)
        .with_report_dir(config.report_dir.clone()))
    }

    /// Run one cycle with a fresh dedup tracker. Errors abort the cycle.
    #[instrument(skip_all, fields(dry_run = self.dry_run))]
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut tracker = DedupTracker::new();

        let snapshot = scan_snapshot(self.store.as_ref(), &self.policy)?;
        let (planned, source) = self.engine.decide_with_source(&snapshot, &mut tracker);
        info!(actions = planned.len(), ?source, "actions selected");

        let (status, results) = if planned.is_empty() {
            info!("nothing to do, cycle idle");
            (CycleStatus::Idle, Vec::new())
        } else if self.dry_run {
            for action in &planned {
                info!(%action, "planned (dry run)");
            }
            (CycleStatus::Planned, Vec::new())
        } else {
            (
                CycleStatus::Completed,
                self.executor.execute_all(planned.clone()),
            )
        };

        Ok(CycleReport {
            status,
            started_at,
            duration_ms: elapsed_ms(clock),
            planned,
            results,
            error: None,
        })
    }

    /// Run one cycle, converting any error or panic into a failed report, and
    /// persist the report when a report directory is configured.
    pub fn run_cycle_guarded(&self) -> CycleReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let report = match catch_unwind(AssertUnwindSafe(|| self.run_cycle())) {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                error!(error = %format!("{err:#}"), "cycle failed");
                CycleReport::failed(started_at, elapsed_ms(clock), format!("{err:#}"))
            }
            Err(_) => {
                error!("cycle panicked");
                CycleReport::failed(started_at, elapsed_ms(clock), "cycle panicked")
            }
        };

        info!(
            status = ?report.status,
            duration_ms = report.duration_ms,
            actions = report.planned.len(),
            succeeded = report.succeeded(),
            failed = report.failures(),
            "cycle finished"
        );

        if let Some(dir) = &self.report_dir {
            match write_cycle_report(dir, &report) {
                Ok(path) => info!(path = %path.display(), "cycle report written"),
                Err(err) => warn!(error = %format!("{err:#}"), "failed to write cycle report"),
            }
        }
        report
    }
}

/// Summary of a [`run_loop`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopOutcome {
    pub cycles: u64,
    pub failed_cycles: u64,
}

/// Run cycles until `stop` is set, sleeping the full `interval` after each one
/// whatever its outcome.
pub fn run_loop<F: FnMut(&CycleReport)>(
    conductor: &Conductor,
    interval: Duration,
    stop: &AtomicBool,
    mut on_cycle: F,
) -> LoopOutcome {
    let mut outcome = LoopOutcome::default();
    while !stop.load(Ordering::SeqCst) {
        let report = conductor.run_cycle_guarded();
        outcome.cycles += 1;
        if report.status == CycleStatus::Failed {
            outcome.failed_cycles += 1;
        }
        on_cycle(&report);

        info!(interval_secs = interval.as_secs(), "sleeping until next cycle");
        if !sleep_unless_stopped(interval, stop) {
            break;
        }
    }
    info!(cycles = outcome.cycles, "loop stopped");
    outcome
}

/// Sleep for `duration` in short slices. Returns `false` if `stop` was set.
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(STOP_POLL));
    }
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NoHooks;
    use crate::test_support::{ScriptedExecutor, ScriptedItemStore, pr_record, task_record};

    fn conductor(store: ScriptedItemStore) -> Conductor {
        Conductor::new(
            Arc::new(store),
            DecisionEngine::deterministic(3),
            TaskExecutor::new(
                Arc::new(ScriptedExecutor::new()),
                Arc::new(NoHooks),
                DispatchConfig {
                    retry: RetryPolicy {
                        max_attempts: 1,
                        delay: Duration::ZERO,
                    },
                    action_timeout: Duration::from_secs(5),
                    monitor_timeout: Duration::from_secs(5),
                    hook_allowance: Duration::ZERO,
                },
            ),
            SnapshotPolicy::default(),
        )
    }

    #[test]
    fn dry_run_plans_without_dispatch() {
        let store = ScriptedItemStore::new(
            vec![pr_record("webapp", 12, "Fix header")],
            vec![task_record("webapp", 55, "Add search", "")],
        );

        let report = conductor(store).with_dry_run(true).run_cycle().expect("cycle");

        assert_eq!(report.status, CycleStatus::Planned);
        assert_eq!(report.planned.len(), 2);
        assert!(report.results.is_empty());
    }

    #[test]
    fn store_failure_becomes_failed_report() {
        let store = ScriptedItemStore::default();
        store.fail_listing("gh: could not resolve host");

        let report = conductor(store).run_cycle_guarded();

        assert_eq!(report.status, CycleStatus::Failed);
        assert!(report.error.as_deref().unwrap_or_default().contains("could not resolve host"));
        assert!(report.planned.is_empty());
    }

    #[test]
    fn guarded_cycle_writes_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let conductor = conductor(ScriptedItemStore::default())
            .with_report_dir(Some(temp.path().join("reports")));

        let report = conductor.run_cycle_guarded();

        assert_eq!(report.status, CycleStatus::Idle);
        let written = std::fs::read_dir(temp.path().join("reports"))
            .expect("read dir")
            .count();
        assert_eq!(written, 1);
    }

    #[test]
    fn sleep_returns_early_once_stopped() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_unless_stopped(Duration::from_secs(30), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
