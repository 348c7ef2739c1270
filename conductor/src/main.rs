//! Periodic PR/task/epic orchestrator.
//!
//! `conductor once` runs a single cycle and prints its JSON report;
//! `conductor run` loops on a fixed interval until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use conductor::core::report::CycleStatus;
use conductor::cycle::{Conductor, run_loop};
use conductor::exit_codes;
use conductor::io::config::{ConductorConfig, load_config};
use conductor::io::environment::validate_environment;
use conductor::logging;

#[derive(Parser)]
#[command(
    name = "conductor",
    version,
    about = "Periodic orchestrator for pull requests, tasks and epics"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply if it is missing.
    #[arg(long, global = true, default_value = "conductor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run exactly one cycle and print its report as JSON.
    Once {
        /// Select actions without dispatching them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run cycles forever on the configured interval.
    Run {
        /// Select actions without dispatching them.
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load(&cli.config)?;
    match cli.command {
        Command::Once { dry_run } => cmd_once(&config, dry_run),
        Command::Run { dry_run } => cmd_run(&config, dry_run),
    }
}

fn load(path: &Path) -> Result<ConductorConfig> {
    load_config(path).with_context(|| format!("load config {}", path.display()))
}

fn cmd_once(config: &ConductorConfig, dry_run: bool) -> Result<i32> {
    let conductor = Conductor::from_config(config, dry_run)?;
    let report = conductor.run_cycle_guarded();
    let json = serde_json::to_string_pretty(&report).context("serialize cycle report")?;
    println!("{json}");
    Ok(match report.status {
        CycleStatus::Failed => exit_codes::CYCLE_FAILED,
        _ => exit_codes::OK,
    })
}

fn cmd_run(config: &ConductorConfig, dry_run: bool) -> Result<i32> {
    let probe_timeout = Duration::from_secs(config.github.command_timeout_secs);
    if let Err(err) = validate_environment(&config.executor.binary, probe_timeout) {
        error!(error = %format!("{err:#}"), "environment check failed");
        eprintln!("{err:#}");
        return Ok(exit_codes::ENVIRONMENT);
    }
    if config.oracle.enabled {
        info!(command = ?config.oracle.command, "decision oracle enabled");
    } else {
        warn!("decision oracle disabled, using deterministic selection only");
    }

    let conductor = Conductor::from_config(config, dry_run)?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("install interrupt handler")?;

    info!(
        interval_secs = config.loop_interval_secs,
        budget = config.max_parallel_actions,
        repos = ?config.github.repos,
        "starting loop"
    );
    let outcome = run_loop(&conductor, config.loop_interval(), &stop, |_| {});
    info!(
        cycles = outcome.cycles,
        failed_cycles = outcome.failed_cycles,
        "stopped by signal"
    );
    Ok(exit_codes::OK)
}
