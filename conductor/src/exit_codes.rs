//! Stable exit codes for conductor CLI commands.

/// Command succeeded, or the loop was stopped by a signal.
pub const OK: i32 = 0;
/// Invalid configuration or other startup errors.
pub const INVALID: i32 = 1;
/// The startup environment check failed (executor binary unusable).
pub const ENVIRONMENT: i32 = 2;
/// `conductor once` ran a cycle that failed.
pub const CYCLE_FAILED: i32 = 3;
