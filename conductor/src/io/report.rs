//! Cycle report persistence.
//!
//! Reports are product artifacts: one pretty-printed JSON file per cycle,
//! named after the cycle start time so a directory listing sorts by time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::report::CycleReport;

pub fn report_path(dir: &Path, report: &CycleReport) -> PathBuf {
    let stamp = report.started_at.format("%Y%m%dT%H%M%S%.3fZ");
    dir.join(format!("cycle-{stamp}.json"))
}

pub fn write_cycle_report(dir: &Path, report: &CycleReport) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create report dir {}", dir.display()))?;
    let path = report_path(dir, report);
    let mut buf = serde_json::to_string_pretty(report)?;
    buf.push('\n');
    fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
