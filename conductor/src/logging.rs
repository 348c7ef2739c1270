//! Tracing setup for the conductor binary.
//!
//! - **Tracing (this module)**: operational diagnostics via `RUST_LOG`,
//!   written to stderr so `conductor once` keeps stdout for its JSON report.
//! - **Cycle reports (`io/report`)**: product artifacts written per cycle when
//!   `report_dir` is configured. Unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `conductor=info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=conductor=debug conductor once --dry-run
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conductor=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
