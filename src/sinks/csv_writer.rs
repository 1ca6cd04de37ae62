use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

/// Per-call log (§6): columns `[label, unixSeconds, elapsedHuman, status]`,
/// appended for every call behind a single writer lock (§5: "acquire → write
/// → flush → release").
pub struct CallLogWriter {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CallLogWriter {
    /// Opens (creating if absent) the per-call log at `path` for append.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(csv::WriterBuilder::new().has_headers(false).from_writer(file)),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the row cannot be written or flushed.
    pub async fn log_call(
        &self,
        label: &str,
        unix_seconds: i64,
        elapsed: std::time::Duration,
        status: CallStatus,
    ) -> AppResult<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_record([
                label,
                &unix_seconds.to_string(),
                &format!("{elapsed:?}"),
                status.as_str(),
            ])
            .map_err(|source| csv_error(&self.path, source))?;
        writer.flush().map_err(|err| {
            AppError::from(std::io::Error::other(format!(
                "flushing call log '{}' failed: {err}",
                self.path.display()
            )))
        })?;
        Ok(())
    }
}

/// Scaling CSV (validation runs, §6): columns `[label, envNodeCount, maxRPS]`,
/// appended once per successful validation Run.
pub struct ScalingCsvWriter {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl ScalingCsvWriter {
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(csv::WriterBuilder::new().has_headers(false).from_writer(file)),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the row cannot be written or flushed.
    pub async fn append_row(&self, label: &str, env_node_count: u64, max_rps: f64) -> AppResult<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_record([label, &env_node_count.to_string(), &format!("{max_rps:.2}")])
            .map_err(|source| csv_error(&self.path, source))?;
        writer.flush().map_err(|err| {
            AppError::from(std::io::Error::other(format!(
                "flushing scaling csv '{}' failed: {err}",
                self.path.display()
            )))
        })?;
        Ok(())
    }
}

/// Whether a logged call succeeded or errored (§6 per-call log column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    Err,
}

impl CallStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Err => "err",
        }
    }
}

fn open_append(path: &Path) -> AppResult<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(AppError::from)
}

fn csv_error(path: &Path, source: csv::Error) -> AppError {
    tracing::error!(path = %path.display(), error = %source, "csv write failed");
    AppError::from(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn call_log_appends_rows() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|err| format!("tempdir failed: {err}"))?;
        let path = dir.path().join("calls.csv");
        let writer = CallLogWriter::open(&path).map_err(|err| format!("open failed: {err}"))?;
        writer
            .log_call("login", 1_700_000_000, Duration::from_millis(12), CallStatus::Ok)
            .await
            .map_err(|err| format!("log_call failed: {err}"))?;
        let contents =
            std::fs::read_to_string(&path).map_err(|err| format!("read failed: {err}"))?;
        if !contents.contains("login") || !contents.contains("ok") {
            return Err(format!("unexpected csv contents: {contents}"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn scaling_csv_appends_rows() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|err| format!("tempdir failed: {err}"))?;
        let path = dir.path().join("scaling.csv");
        let writer = ScalingCsvWriter::open(&path).map_err(|err| format!("open failed: {err}"))?;
        writer
            .append_row("login", 3, 40.0)
            .await
            .map_err(|err| format!("append_row failed: {err}"))?;
        let contents =
            std::fs::read_to_string(&path).map_err(|err| format!("read failed: {err}"))?;
        if !contents.contains("40.00") {
            return Err(format!("unexpected csv contents: {contents}"));
        }
        Ok(())
    }
}
