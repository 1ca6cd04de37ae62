//! Runner (C6, §4.5): owns one handle's lifecycle from ramp-up through
//! shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OnceCell, broadcast, mpsc, watch};

use crate::attacker::{Attacker, AttackerFactory};
use crate::config::RunnerConfig;
use crate::error::AppResult;
use crate::metrics::{self, Collector, PipelineEvent};
use crate::rampup;
use crate::rate::RateLimiter;
use crate::report::RunReport;
use crate::sinks::{CallLogWriter, CallStatus};
use crate::stop::{CustomStop, StopQuery, StopTrip, TestStage};
use crate::worker::{self, CallRecord, TokenSource};

/// One-per-handle mutable state (§3 "Runner (mutable, one-per-handle)").
struct RunnerState {
    config: RunnerConfig,
    rate_log: Vec<f64>,
    max_rps: f64,
    failed: bool,
    stopped: bool,
    run_error: Option<String>,
}

/// Owns the lifecycle of C1–C5 for one handle (§2, §4.5).
///
/// Workers hold an [`Arc`] back-reference to their Runner for metric
/// registration and read-only config access (§3 "Ownership"; Design Notes
/// "Weak back-reference" — a plain `Arc` is used here since a Runner never
/// outlives its step and no Worker outlives its Runner, so no cycle forms).
pub struct Runner {
    handle_name: String,
    state: Mutex<RunnerState>,
    stage_tx: watch::Sender<TestStage>,
    shutdown_once: OnceCell<()>,
    quit_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
}

impl Runner {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Arc<Self> {
        let (stage_tx, _stage_rx) = watch::channel(TestStage::RampUp);
        #[expect(clippy::cast_possible_truncation)]
        let (quit_tx, _quit_rx) = broadcast::channel(config.max_attackers.max(1) as usize);
        Arc::new(Self {
            handle_name: config.handle_name.clone(),
            state: Mutex::new(RunnerState {
                config,
                rate_log: Vec::new(),
                max_rps: 0.0,
                failed: false,
                stopped: false,
                run_error: None,
            }),
            stage_tx,
            shutdown_once: OnceCell::new(),
            quit_tx,
            shutting_down: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn handle_name(&self) -> &str {
        &self.handle_name
    }

    /// Read-only snapshot of the current config (cheap clone; mutated only by
    /// [`Self::apply_validation_params`], §4.6).
    pub async fn config(&self) -> RunnerConfig {
        self.state.lock().await.config.clone()
    }

    #[must_use]
    pub fn quit_receiver(&self) -> broadcast::Receiver<()> {
        self.quit_tx.subscribe()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Applies the in-place mutation a `sequence_validate` step performs
    /// before a handle's second Run (§4.6).
    pub async fn apply_validation_params(&self) {
        let mut state = self.state.lock().await;
        let Some(validation) = state.config.validation.clone() else {
            return;
        };
        let max_rps = state.max_rps;
        state.rate_log.clear();
        state.config.is_validation_run = true;
        state.config.attack_time_sec = validation.attack_time_sec;
        state.config.ramp_up_time_sec = 1;
        state.config.store_data = false;
        let target = (validation.threshold * max_rps).floor().max(1.0);
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            state.config.rps = target as u64;
        }
    }

    #[must_use]
    pub async fn max_rps(&self) -> f64 {
        self.state.lock().await.max_rps
    }

    async fn is_stopped(&self) -> bool {
        self.state.lock().await.stopped
    }

    async fn mark_stopped(&self, reason: String) {
        let mut state = self.state.lock().await;
        state.stopped = true;
        state.failed = true;
        state.run_error = Some(reason);
    }

    async fn sample_rate(&self, rate: f64) {
        let mut state = self.state.lock().await;
        state.rate_log.push(rate);
        if rate > state.max_rps {
            state.max_rps = rate;
        }
    }

    /// Idempotent shutdown (§4.5, §5): broadcasts `quit` once, awaits every
    /// Worker. Safe under concurrent callers — only the first caller's
    /// closure runs; everyone awaits the same completion.
    async fn shutdown(&self, workers: Vec<tokio::task::JoinHandle<()>>) {
        self.shutdown_once
            .get_or_init(|| async {
                self.shutting_down.store(true, Ordering::SeqCst);
                drop(self.quit_tx.send(()));
            })
            .await;
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::error!(handle = %self.handle_name, error = %err, "worker task panicked");
            }
        }
    }
}

/// Runs one full Run for `runner`: ramp-up, steady state, shutdown (§4.5).
///
/// # Errors
///
/// Never returns `Err` for per-call or stop-condition failures — those are
/// folded into the returned [`RunReport`]'s `failed`/`run_error` fields (§7
/// propagation policy). Only a panicked collector task surfaces as an error.
pub async fn run(
    runner: &Arc<Runner>,
    attacker_factory: AttackerFactory,
    external: Option<Arc<dyn StopQuery>>,
    custom_stops: HashMap<String, CustomStop>,
    shutdown_rx: watch::Receiver<bool>,
    call_log: Option<Arc<CallLogWriter>>,
) -> AppResult<RunReport> {
    let mut shutdown_rx = shutdown_rx;
    let started_at = Utc::now();
    let config = runner.config().await;

    if config.wait_before_sec > 0 {
        tokio::time::sleep(Duration::from_secs(config.wait_before_sec)).await;
    }

    let mut lead_attacker = attacker_factory(&config, runner);
    if let Err(err) = lead_attacker.before_run(&config).await {
        tracing::error!(handle = %runner.handle_name, error = %err, "before_run hook failed");
    }

    let collector = metrics::spawn(1024);
    let (next_tx, next_rx) = mpsc::channel::<()>(1);
    let tokens: TokenSource = Arc::new(Mutex::new(next_rx));
    let mut workers: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    let mut supervisor = (!config.stop_if.is_empty()).then(|| {
        crate::stop::spawn(
            runner.handle_name.clone(),
            config.stop_if.clone(),
            runner.stage_tx.subscribe(),
            collector.lifetime_rx.clone(),
            collector.ramp_rx.clone(),
            external,
            custom_stops,
        )
    });

    run_ramp_up(
        runner,
        &config,
        lead_attacker.as_ref(),
        &tokens,
        &next_tx,
        &collector,
        &mut workers,
        supervisor.as_mut(),
        &mut shutdown_rx,
        call_log.as_ref(),
    )
    .await;

    if !runner.is_stopped().await {
        drive_steady_state(
            runner,
            &config,
            &next_tx,
            &collector,
            supervisor.as_mut(),
            &mut shutdown_rx,
        )
        .await;
    }

    if let Some(supervisor) = supervisor.as_ref() {
        supervisor.abort();
    }
    runner.shutdown(workers).await;

    let final_metrics = collector.finish().await.map_err(crate::error::AppError::from)?;
    let finished_at = Utc::now();
    let mut report = {
        let state = runner.state.lock().await;
        RunReport::new(
            started_at,
            finished_at,
            state.config.clone(),
            final_metrics,
            state.run_error.clone(),
            state.failed,
        )
    };
    lead_attacker.after_run(&mut report).await;
    Ok(report)
}

#[expect(clippy::too_many_arguments)]
async fn run_ramp_up(
    runner: &Arc<Runner>,
    config: &RunnerConfig,
    prototype: &dyn Attacker,
    tokens: &TokenSource,
    next_tx: &mpsc::Sender<()>,
    collector: &Collector,
    workers: &mut Vec<tokio::task::JoinHandle<()>>,
    mut supervisor: Option<&mut crate::stop::Supervisor>,
    shutdown_rx: &mut watch::Receiver<bool>,
    call_log: Option<&Arc<CallLogWriter>>,
) {
    drop(runner.stage_tx.send(TestStage::RampUp));
    let mut current_workers: u64 = 0;

    for tick in 1..=config.ramp_up_time_sec {
        if runner.is_stopped().await
            || check_trip(runner, supervisor.as_deref_mut()).await
            || *shutdown_rx.borrow_and_update()
        {
            if *shutdown_rx.borrow() {
                runner.mark_stopped("suite received shutdown signal".to_owned()).await;
            }
            return;
        }

        let observed_rate = collector
            .ramp_rx
            .borrow()
            .get(runner.handle_name())
            .map_or(0.0, |label| label.stats.rate);
        #[expect(clippy::cast_precision_loss)]
        let target_rate = config.ramp_tick_rps(tick) as f64;
        let wanted = rampup::target_worker_count(
            config.ramp_up_strategy,
            tick,
            config.ramp_up_time_sec,
            current_workers,
            observed_rate,
            target_rate,
            config.max_attackers,
        );
        spawn_workers_to(
            wanted,
            &mut current_workers,
            runner,
            config,
            prototype,
            tokens,
            &collector.events_tx,
            workers,
            call_log,
        );

        let tick_rps = config.ramp_tick_rps(tick);
        let limiter = RateLimiter::new(tick_rps);
        // A fresh limiter's first `take` is immediate; one extra `take`
        // absorbs that bias so this second still emits exactly `tick_rps`
        // tokens (§4.1).
        limiter.take().await;
        for _ in 0..tick_rps {
            limiter.take().await;
            if next_tx.send(()).await.is_err() {
                return;
            }
        }
        drop(collector.events_tx.send(PipelineEvent::RampTickBoundary).await);
    }
}

async fn drive_steady_state(
    runner: &Arc<Runner>,
    config: &RunnerConfig,
    next_tx: &mpsc::Sender<()>,
    collector: &Collector,
    mut supervisor: Option<&mut crate::stop::Supervisor>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    drop(runner.stage_tx.send(TestStage::SteadyState));
    let steady_secs = config.steady_state_sec();
    if steady_secs == 0 {
        return;
    }

    let limiter = RateLimiter::new(config.rps);
    let deadline = tokio::time::sleep(Duration::from_secs(steady_secs));
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            () = &mut deadline => break,
            () = limiter.take() => {
                if next_tx.send(()).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let rate = collector
                    .lifetime_rx
                    .borrow()
                    .get(runner.handle_name())
                    .map_or(0.0, |label| label.stats.rate);
                runner.sample_rate(rate).await;
            }
            trip = trip_future(supervisor.as_deref_mut()) => {
                if let Some(trip) = trip {
                    runner.mark_stopped(trip.reason).await;
                }
                break;
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    runner.mark_stopped("suite received shutdown signal".to_owned()).await;
                    break;
                }
            }
        }
    }
}

async fn trip_future(supervisor: Option<&mut crate::stop::Supervisor>) -> Option<StopTrip> {
    match supervisor {
        Some(supervisor) => (&mut supervisor.tripped).await.ok(),
        None => std::future::pending().await,
    }
}

async fn check_trip(runner: &Arc<Runner>, supervisor: Option<&mut crate::stop::Supervisor>) -> bool {
    let Some(supervisor) = supervisor else {
        return false;
    };
    match supervisor.tripped.try_recv() {
        Ok(trip) => {
            runner.mark_stopped(trip.reason).await;
            true
        }
        Err(_) => false,
    }
}

#[expect(clippy::too_many_arguments)]
fn spawn_workers_to(
    wanted: u64,
    current_workers: &mut u64,
    runner: &Arc<Runner>,
    config: &RunnerConfig,
    prototype: &dyn Attacker,
    tokens: &TokenSource,
    results_tx: &mpsc::Sender<PipelineEvent>,
    workers: &mut Vec<tokio::task::JoinHandle<()>>,
    call_log: Option<&Arc<CallLogWriter>>,
) {
    while *current_workers < wanted {
        let attacker = prototype.clone_for(runner);
        let handle_name = config.handle_name.clone();
        let tokens = Arc::clone(tokens);
        let quit_rx = runner.quit_receiver();
        let do_timeout = Duration::from_secs(config.do_timeout_sec);
        let (call_tx, mut call_rx) = mpsc::channel(64);
        let pipeline_tx = results_tx.clone();
        let call_log = call_log.cloned();

        workers.push(tokio::spawn(worker::run_worker(
            handle_name.clone(),
            attacker,
            Arc::clone(runner),
            config.clone(),
            tokens,
            quit_rx,
            call_tx,
            do_timeout,
        )));
        workers.push(tokio::spawn(async move {
            while let Some(record) = call_rx.recv().await {
                if let Some(writer) = call_log.as_ref() {
                    log_call(writer, &handle_name, &record).await;
                }
                if pipeline_tx.send(PipelineEvent::Call(record)).await.is_err() {
                    break;
                }
            }
        }));

        *current_workers = current_workers.saturating_add(1);
    }
}

async fn log_call(writer: &CallLogWriter, handle_name: &str, record: &CallRecord) {
    let status = if record.result.is_failure() {
        CallStatus::Err
    } else {
        CallStatus::Ok
    };
    if let Err(err) = writer
        .log_call(handle_name, Utc::now().timestamp(), record.elapsed, status)
        .await
    {
        tracing::error!(handle = %handle_name, error = %err, "failed to append per-call log row");
    }
}
