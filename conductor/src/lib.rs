//! Periodic orchestrator for pull requests, tasks and epics.
//!
//! Each cycle scans the tracked repositories into an immutable snapshot,
//! decides which follow-up actions to run within a fixed concurrency budget,
//! and dispatches them to an external executor with retry and timeout
//! handling. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, selection,
//!   deduplication, results). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (`gh`, the agent executor, the
//!   decision oracle, configuration, reports). Behind traits so tests can
//!   script them.
//!
//! Orchestration modules ([`scan`], [`decide`], [`dispatch`], [`cycle`])
//! coordinate core logic with I/O to implement the CLI commands.

pub mod core;
pub mod cycle;
pub mod decide;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod scan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
