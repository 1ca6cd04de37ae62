use thiserror::Error;

/// Errors surfaced while a single [`crate::runner::Runner`] is executing.
///
/// Per-call failures never reach here — they are folded into metrics. This
/// enum only covers failures that abort or degrade the run itself.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("handle '{handle}' failed validation before it could run: {source}")]
    InvalidConfig {
        handle: String,
        #[source]
        source: super::ValidationError,
    },
    #[error("handle '{handle}' stopped because its stop-condition tripped")]
    StopConditionTripped { handle: String },
    #[error("handle '{handle}' attacker Setup failed for every worker; none survived")]
    NoWorkersSurvivedSetup { handle: String },
    #[error("handle '{handle}' worker task panicked: {source}")]
    WorkerPanicked {
        handle: String,
        #[source]
        source: tokio::task::JoinError,
    },
    #[error("handle '{handle}' report could not be written to '{path}': {source}")]
    ReportWriteFailed {
        handle: String,
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
