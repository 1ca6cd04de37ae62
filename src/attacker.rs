//! The contract a user implements to describe one kind of request (§4.10).
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RunnerConfig;
use crate::report::RunReport;
use crate::runner::Runner;

/// Outcome of a single `Do` invocation.
///
/// An error or a status code `>= 400` classifies the call as failed; see
/// [`DoResult::is_failure`].
#[derive(Debug, Clone, Default)]
pub struct DoResult {
    pub request_label: String,
    pub error: Option<String>,
    pub status_code: u16,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl DoResult {
    #[must_use]
    pub fn ok(request_label: impl Into<String>, status_code: u16) -> Self {
        Self {
            request_label: request_label.into(),
            error: None,
            status_code,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    #[must_use]
    pub fn failed(request_label: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_label: request_label.into(),
            error: Some(error.into()),
            status_code: 0,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// The distinguished error value a timed-out `Do` is reported with (§4.2).
    pub const TIMEOUT_ERROR: &'static str = "Attack Do(ctx) timed out";

    #[must_use]
    pub fn timeout(request_label: impl Into<String>) -> Self {
        Self::failed(request_label, Self::TIMEOUT_ERROR)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status_code >= 400
    }
}

/// Delegation point for "has a runner" (Design Notes: replaces the source's
/// embedded base-struct idiom with plain composition).
pub trait HasRunner {
    fn runner(&self) -> &Arc<Runner>;
}

/// A user-supplied workload generator, cloned once per [`crate::worker::Worker`].
///
/// Implementors should keep `Do` cheap to clone into and safe to call
/// concurrently across independently-owned clones; the Runner never calls
/// two methods on the same clone concurrently.
#[async_trait]
pub trait Attacker: Send + Sync {
    /// Called once per Worker before its first `Do`. A returned error drops
    /// the Worker; the run continues if at least one other Worker survives.
    async fn setup(&mut self, _config: &RunnerConfig) -> Result<(), String> {
        Ok(())
    }

    /// Called once per token. Must honour `deadline` and should cancel any
    /// in-flight work once it elapses.
    async fn do_call(&mut self, deadline: Duration) -> DoResult;

    /// Called once during drain. Errors are logged, not fatal.
    async fn teardown(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Produces a fresh instance bound to the given Runner. State
    /// established in `setup` may be shared through the Runner back-reference.
    fn clone_for(&self, runner: &Arc<Runner>) -> Box<dyn Attacker>;

    /// Invoked once before `Run`, before any Worker exists.
    async fn before_run(&mut self, _config: &RunnerConfig) -> Result<(), String> {
        Ok(())
    }

    /// Invoked once after the run completes; may mutate the report.
    async fn after_run(&mut self, _report: &mut RunReport) {}
}

/// A constructor the registry (§"Dynamic attacker factory by string name" in
/// Design Notes) uses to produce the first attacker instance bound to a
/// Runner. Subsequent instances come from [`Attacker::clone_for`], which
/// only takes the Runner — config is read once, at construction.
pub type AttackerFactory = Arc<dyn Fn(&RunnerConfig, &Arc<Runner>) -> Box<dyn Attacker> + Send + Sync>;
