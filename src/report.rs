//! Report Builder (C9, §4.9): one JSON `RunReport` per handle, plus the
//! `<handle>_last` pointer file used for degradation comparisons.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RunnerConfig;
use crate::error::{AppError, AppResult, RunnerError};
use crate::metrics::{LabelSnapshot, Snapshot};

/// Final outcome of one Run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub configuration: RunnerConfig,
    pub metrics: HashMap<String, LabelSnapshot>,
    pub run_error: Option<String>,
    pub failed: bool,
    pub output: serde_json::Value,
}

impl RunReport {
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        configuration: RunnerConfig,
        metrics: Snapshot,
        run_error: Option<String>,
        failed: bool,
    ) -> Self {
        Self {
            started_at,
            finished_at,
            configuration,
            metrics,
            run_error,
            failed,
            output: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn label(&self, handle: &str) -> Option<&LabelSnapshot> {
        self.metrics.get(handle)
    }
}

/// Writes `report` to `<report_dir>/<handle>-<epoch_secs>.json`, and — unless
/// `report` is degraded relative to the prior non-degraded report named by
/// `<handle>_last` — updates that pointer file to the new timestamp (§4.9).
///
/// Degradation test: `current.p50 / last.p50 >= threshold_percent` (the
/// configured `handle_threshold_percent`); informational, does not itself
/// fail the suite.
///
/// # Errors
///
/// Returns [`RunnerError::ReportWriteFailed`] if the report or pointer file
/// cannot be written.
pub fn write_report(
    report_dir: &Path,
    handle: &str,
    epoch_secs: i64,
    threshold_percent: f64,
    report: &RunReport,
) -> AppResult<bool> {
    std::fs::create_dir_all(report_dir).map_err(|source| {
        AppError::runner(RunnerError::ReportWriteFailed {
            handle: handle.to_owned(),
            path: report_dir.to_path_buf(),
            source,
        })
    })?;

    let report_path = report_dir.join(format!("{handle}-{epoch_secs}.json"));
    let body = serde_json::to_vec_pretty(report)?;
    std::fs::write(&report_path, body).map_err(|source| {
        AppError::runner(RunnerError::ReportWriteFailed {
            handle: handle.to_owned(),
            path: report_path.clone(),
            source,
        })
    })?;

    let degraded = is_degraded(report_dir, handle, report, threshold_percent);
    if !degraded {
        let pointer_path = last_pointer_path(report_dir, handle);
        std::fs::write(&pointer_path, epoch_secs.to_string()).map_err(|source| {
            AppError::runner(RunnerError::ReportWriteFailed {
                handle: handle.to_owned(),
                path: pointer_path,
                source,
            })
        })?;
    }

    Ok(degraded)
}

fn last_pointer_path(report_dir: &Path, handle: &str) -> PathBuf {
    report_dir.join(format!("{handle}_last"))
}

fn is_degraded(report_dir: &Path, handle: &str, report: &RunReport, threshold_percent: f64) -> bool {
    let Some(last_epoch) = read_last_pointer(report_dir, handle) else {
        return false;
    };
    let last_path = report_dir.join(format!("{handle}-{last_epoch}.json"));
    let Ok(contents) = std::fs::read_to_string(last_path) else {
        return false;
    };
    let Ok(last_report) = serde_json::from_str::<RunReport>(&contents) else {
        return false;
    };
    let Some(last_label) = last_report.label(handle) else {
        return false;
    };
    let Some(current_label) = report.label(handle) else {
        return false;
    };
    if last_label.stats.p50_ms == 0 {
        return false;
    }
    let ratio = current_label.stats.p50_ms as f64 / last_label.stats.p50_ms as f64;
    ratio >= threshold_percent
}

fn read_last_pointer(report_dir: &Path, handle: &str) -> Option<i64> {
    let pointer = last_pointer_path(report_dir, handle);
    std::fs::read_to_string(pointer)
        .ok()
        .and_then(|contents| contents.trim().parse().ok())
}
