//! Suite Driver (C8, §4.8): walks an ordered list of steps; each step runs
//! its handles in parallel, sequence, or sequence-with-validation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::attacker::AttackerFactory;
use crate::config::{ExecutionMode, RunnerConfig, Step, SuiteConfig};
use crate::error::{AppError, AppResult};
use crate::registry::AttackerRegistry;
use crate::report::{self, RunReport};
use crate::runner::{self, Runner};
use crate::sinks::{CallLogWriter, ScalingCsvWriter};
use crate::stop::{CustomStop, StopQuery};

/// One handle's outcome within a step: the primary Run, plus (for
/// `sequence_validate`) the validation replay (§4.6).
struct HandleOutcome {
    handle_name: String,
    report: RunReport,
    validation_report: Option<RunReport>,
    validation_configured: bool,
}

/// Aggregate suite result after every step has run (§4.8, §6 process contract).
#[derive(Debug, Clone, Copy, Default)]
pub struct SuiteStatus {
    pub failed: bool,
    pub validation_failed: bool,
    pub any_validation_configured: bool,
    pub shutdown_triggered: bool,
}

impl SuiteStatus {
    /// §6: "Exit code 1 iff `ValidationFailed` (or any suite-level `Failed`
    /// when no validation was configured)." A signal-triggered shutdown
    /// always exits 1 (§4.8, §8 scenario 6) regardless of validation.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.shutdown_triggered || self.validation_failed {
            1
        } else if self.failed && !self.any_validation_configured {
            1
        } else {
            0
        }
    }
}

/// Everything a Run needs that is shared across every handle in the suite.
pub struct SuiteRunParams<'a> {
    pub registry: &'a AttackerRegistry,
    pub report_dir: &'a Path,
    pub handle_threshold_percent: f64,
    pub scaling_csv: &'a ScalingCsvWriter,
    pub external: Option<Arc<dyn StopQuery>>,
    pub custom_stops: HashMap<String, CustomStop>,
    pub call_log: Option<Arc<CallLogWriter>>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Runs every step of `suite` in order (§4.8).
///
/// # Errors
///
/// Returns an error if an attacker label cannot be resolved, a worker task
/// panics, or a report/scaling-csv write fails. Per-handle Run failures are
/// folded into the returned [`SuiteStatus`] rather than surfaced as `Err`.
pub async fn run_suite(suite: &SuiteConfig, params: &SuiteRunParams<'_>) -> AppResult<SuiteStatus> {
    let any_validation_configured = suite
        .steps
        .iter()
        .flat_map(|step| step.handles.iter())
        .any(|handle| handle.validation.is_some());
    let mut status = SuiteStatus {
        any_validation_configured,
        ..SuiteStatus::default()
    };

    for step in &suite.steps {
        let outcomes = match step.execution_mode {
            ExecutionMode::Parallel => run_parallel(step, params).await?,
            ExecutionMode::Sequence => run_sequence(step, params).await?,
            ExecutionMode::SequenceValidate => run_sequence_validate(step, params).await?,
        };

        for outcome in &outcomes {
            write_handle_reports(outcome, params)?;
            if outcome.report.failed {
                status.failed = true;
                if outcome.validation_configured {
                    status.validation_failed = true;
                }
            }
            if let Some(validation_report) = outcome.validation_report.as_ref() {
                if validation_report.failed {
                    status.failed = true;
                    status.validation_failed = true;
                }
            }
        }

        if *params.shutdown_rx.borrow() {
            status.shutdown_triggered = true;
            status.failed = true;
            break;
        }
    }

    Ok(status)
}

async fn run_parallel(step: &Step, params: &SuiteRunParams<'_>) -> AppResult<Vec<HandleOutcome>> {
    let mut set = JoinSet::new();
    for config in step.handles.clone() {
        let factory = params.registry.get(&config.attacker)?.clone();
        let external = params.external.clone();
        let custom_stops = params.custom_stops.clone();
        let call_log = params.call_log.clone();
        let shutdown_rx = params.shutdown_rx.clone();
        set.spawn(run_handle(config, factory, external, custom_stops, call_log, shutdown_rx));
    }

    let mut outcomes = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let outcome = joined.map_err(AppError::from)??;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

async fn run_sequence(step: &Step, params: &SuiteRunParams<'_>) -> AppResult<Vec<HandleOutcome>> {
    let mut outcomes = Vec::with_capacity(step.handles.len());
    for config in step.handles.clone() {
        let factory = params.registry.get(&config.attacker)?.clone();
        outcomes.push(
            run_handle(
                config,
                factory,
                params.external.clone(),
                params.custom_stops.clone(),
                params.call_log.clone(),
                params.shutdown_rx.clone(),
            )
            .await?,
        );
    }
    Ok(outcomes)
}

async fn run_sequence_validate(
    step: &Step,
    params: &SuiteRunParams<'_>,
) -> AppResult<Vec<HandleOutcome>> {
    let mut outcomes = Vec::with_capacity(step.handles.len());
    for config in &step.handles {
        let factory = params.registry.get(&config.attacker)?.clone();
        let runner = Runner::new(config.clone());
        let report = runner::run(
            &runner,
            Arc::clone(&factory),
            params.external.clone(),
            params.custom_stops.clone(),
            params.shutdown_rx.clone(),
            params.call_log.clone(),
        )
        .await?;

        let mut validation_report = None;
        let validation_configured = config.validation.is_some();
        if !report.failed && validation_configured {
            runner.apply_validation_params().await;
            let second = runner::run(
                &runner,
                factory,
                params.external.clone(),
                params.custom_stops.clone(),
                params.shutdown_rx.clone(),
                params.call_log.clone(),
            )
            .await?;
            if !second.failed {
                params
                    .scaling_csv
                    .append_row(&config.handle_name, env_node_count(), runner.max_rps().await)
                    .await?;
            }
            validation_report = Some(second);
        }

        outcomes.push(HandleOutcome {
            handle_name: config.handle_name.clone(),
            report,
            validation_report,
            validation_configured,
        });
    }
    Ok(outcomes)
}

async fn run_handle(
    config: RunnerConfig,
    factory: AttackerFactory,
    external: Option<Arc<dyn StopQuery>>,
    custom_stops: HashMap<String, CustomStop>,
    call_log: Option<Arc<CallLogWriter>>,
    shutdown_rx: watch::Receiver<bool>,
) -> AppResult<HandleOutcome> {
    let handle_name = config.handle_name.clone();
    let runner = Runner::new(config);
    let report = runner::run(&runner, factory, external, custom_stops, shutdown_rx, call_log).await?;
    Ok(HandleOutcome {
        handle_name,
        report,
        validation_report: None,
        validation_configured: false,
    })
}

fn write_handle_reports(outcome: &HandleOutcome, params: &SuiteRunParams<'_>) -> AppResult<()> {
    let epoch = outcome.report.finished_at.timestamp();
    report::write_report(
        params.report_dir,
        &outcome.handle_name,
        epoch,
        params.handle_threshold_percent,
        &outcome.report,
    )?;
    if let Some(validation_report) = outcome.validation_report.as_ref() {
        report::write_report(
            params.report_dir,
            &outcome.handle_name,
            validation_report.finished_at.timestamp(),
            params.handle_threshold_percent,
            validation_report,
        )?;
    }
    Ok(())
}

/// The validation-replay node count a scaling-CSV row is stamped with;
/// provided by the environment because only the orchestrator deploying a
/// generator fleet knows how many hosts shared this Run (§4.5).
fn env_node_count() -> u64 {
    std::env::var("NETWORK_NODES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attacker::{Attacker, DoResult};
    use crate::config::RampUpStrategy;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Instant200;

    #[async_trait]
    impl Attacker for Instant200 {
        async fn do_call(&mut self, _deadline: Duration) -> DoResult {
            DoResult::ok("noop", 200)
        }

        fn clone_for(&self, _runner: &Arc<Runner>) -> Box<dyn Attacker> {
            Box::new(Instant200)
        }
    }

    fn handle(name: &str) -> RunnerConfig {
        RunnerConfig {
            handle_name: name.to_owned(),
            attacker: "noop".to_owned(),
            rps: 5,
            attack_time_sec: 2,
            ramp_up_time_sec: 1,
            max_attackers: 2,
            do_timeout_sec: 1,
            ramp_up_strategy: RampUpStrategy::Linear,
            stop_if: Vec::new(),
            validation: None,
            is_validation_run: false,
            store_data: false,
            wait_before_sec: 0,
            metadata: HashMap::new(),
        }
    }

    fn registry() -> AttackerRegistry {
        let mut registry = AttackerRegistry::new();
        registry.register(
            "noop",
            Arc::new(|_config: &RunnerConfig, _runner: &Arc<Runner>| -> Box<dyn Attacker> { Box::new(Instant200) }),
        );
        registry
    }

    #[tokio::test]
    async fn parallel_step_runs_every_handle_and_writes_reports() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|err| format!("tempdir failed: {err}"))?;
        let scaling_path = dir.path().join("scaling.csv");
        let scaling_csv = ScalingCsvWriter::open(&scaling_path)
            .map_err(|err| format!("open scaling csv failed: {err}"))?;
        let registry = registry();
        let (_shutdown_tx, shutdown_rx) = crate::shutdown::shutdown_channel();

        let suite = SuiteConfig {
            dumptransport: false,
            goroutines_dump: false,
            http_timeout_sec: 30,
            steps: vec![Step {
                name: "smoke".to_owned(),
                execution_mode: ExecutionMode::Parallel,
                handles: vec![handle("login"), handle("logout")],
            }],
        };

        let params = SuiteRunParams {
            registry: &registry,
            report_dir: dir.path(),
            handle_threshold_percent: 1.2,
            scaling_csv: &scaling_csv,
            external: None,
            custom_stops: HashMap::new(),
            call_log: None,
            shutdown_rx,
        };

        let status = run_suite(&suite, &params)
            .await
            .map_err(|err| format!("run_suite failed: {err}"))?;
        if status.failed || status.exit_code() != 0 {
            return Err("expected a clean parallel step to pass".to_owned());
        }
        if !dir.path().join("login_last").exists() || !dir.path().join("logout_last").exists() {
            return Err("expected a report pointer file per handle".to_owned());
        }
        Ok(())
    }

    #[tokio::test]
    async fn sequence_validate_appends_scaling_row_on_success() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|err| format!("tempdir failed: {err}"))?;
        let scaling_path = dir.path().join("scaling.csv");
        let scaling_csv = ScalingCsvWriter::open(&scaling_path)
            .map_err(|err| format!("open scaling csv failed: {err}"))?;
        let registry = registry();
        let (_shutdown_tx, shutdown_rx) = crate::shutdown::shutdown_channel();

        let mut config = handle("login");
        config.validation = Some(crate::config::ValidationParams {
            attack_time_sec: 2,
            threshold: 0.5,
        });

        let suite = SuiteConfig {
            dumptransport: false,
            goroutines_dump: false,
            http_timeout_sec: 30,
            steps: vec![Step {
                name: "validate".to_owned(),
                execution_mode: ExecutionMode::SequenceValidate,
                handles: vec![config],
            }],
        };

        let params = SuiteRunParams {
            registry: &registry,
            report_dir: dir.path(),
            handle_threshold_percent: 1.2,
            scaling_csv: &scaling_csv,
            external: None,
            custom_stops: HashMap::new(),
            call_log: None,
            shutdown_rx,
        };

        let status = run_suite(&suite, &params)
            .await
            .map_err(|err| format!("run_suite failed: {err}"))?;
        if status.failed {
            return Err("expected the validation replay to succeed".to_owned());
        }
        let contents = std::fs::read_to_string(&scaling_path)
            .map_err(|err| format!("reading scaling csv failed: {err}"))?;
        if !contents.contains("login") {
            return Err(format!("expected a scaling row for login, got: {contents}"));
        }
        Ok(())
    }
}
