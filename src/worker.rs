//! Token consumer: `next`/`quit` select loop around a deadlined `Do` (§4.2).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::Instant;

use crate::attacker::{Attacker, DoResult};
use crate::config::RunnerConfig;
use crate::runner::Runner;

/// Shared by every Worker in a Runner so the rate limiter's tokens are
/// consumed by whichever Worker is free next (§4.2: "the token channel
/// enforces back-pressure; it is unbuffered").
pub type TokenSource = Arc<Mutex<mpsc::Receiver<()>>>;

/// One completed call, timestamped for `RateLog`/latency bookkeeping (§3).
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub result: DoResult,
    pub begin: Instant,
    pub end: Instant,
    pub elapsed: Duration,
}

/// Runs one Worker to completion: calls `Setup` once, consumes tokens until
/// `quit` fires, then tears down its Attacker once and returns.
///
/// A `Setup` failure drops the Worker without entering the token loop (§4.2,
/// §4.5 "Worker `Setup` failure"); the Run continues as long as at least one
/// other Worker survives.
pub async fn run_worker(
    handle_name: String,
    mut attacker: Box<dyn Attacker>,
    runner: Arc<Runner>,
    config: RunnerConfig,
    tokens: TokenSource,
    mut quit_rx: broadcast::Receiver<()>,
    results_tx: mpsc::Sender<CallRecord>,
    do_timeout: Duration,
) {
    if let Err(err) = attacker.setup(&config).await {
        tracing::warn!(handle = %handle_name, error = %err, "attacker setup failed; worker dropped");
        return;
    }

    loop {
        let token = {
            let mut guard = tokens.lock().await;
            tokio::select! {
                biased;
                _ = quit_rx.recv() => None,
                token = guard.recv() => token,
            }
        };
        if token.is_none() {
            break;
        }

        let record = call_once(&handle_name, attacker.as_ref(), &runner, do_timeout).await;
        if results_tx.send(record).await.is_err() {
            break;
        }
    }

    if let Err(err) = attacker.teardown().await {
        tracing::warn!(handle = %handle_name, error = %err, "attacker teardown failed");
    }
}

/// Spawns a subordinate task running `Do` on its own cloned Attacker instance
/// and races it against `do_timeout`. On timeout the subordinate keeps
/// running to completion in the background (Design Notes: "Timeout via
/// racing task") — its `JoinHandle` is simply never awaited again, so it
/// cannot publish twice ("single-fire completion gate"). Cloning per call
/// (rather than sharing the Worker's own Attacker behind a lock) means a
/// straggling subordinate can never block the next `Do` or the eventual
/// `teardown` on the Worker's own instance.
async fn call_once(
    handle_name: &str,
    attacker: &dyn Attacker,
    runner: &Arc<Runner>,
    do_timeout: Duration,
) -> CallRecord {
    let begin = Instant::now();

    let mut subordinate = attacker.clone_for(runner);
    let mut task = tokio::spawn(async move { subordinate.do_call(do_timeout).await });

    let result = tokio::select! {
        joined = &mut task => joined.unwrap_or_else(|err| {
            DoResult::failed(handle_name, format!("worker task panicked: {err}"))
        }),
        () = tokio::time::sleep(do_timeout) => DoResult::timeout(handle_name),
    };

    let end = Instant::now();
    CallRecord {
        result,
        begin,
        end,
        elapsed: end.saturating_duration_since(begin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc as StdArc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    struct SleepyAttacker {
        sleep_for: Duration,
        calls: StdArc<AtomicU64>,
    }

    fn sample_config() -> RunnerConfig {
        RunnerConfig {
            handle_name: "h".to_owned(),
            attacker: "sleepy".to_owned(),
            rps: 1,
            attack_time_sec: 2,
            ramp_up_time_sec: 1,
            max_attackers: 1,
            do_timeout_sec: 1,
            ramp_up_strategy: crate::config::RampUpStrategy::Linear,
            stop_if: Vec::new(),
            validation: None,
            is_validation_run: false,
            store_data: false,
            wait_before_sec: 0,
            metadata: std::collections::HashMap::new(),
        }
    }

    #[async_trait]
    impl Attacker for SleepyAttacker {
        async fn do_call(&mut self, _deadline: Duration) -> DoResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.sleep_for).await;
            DoResult::ok("sleepy", 200)
        }

        fn clone_for(&self, _runner: &StdArc<crate::runner::Runner>) -> Box<dyn Attacker> {
            Box::new(SleepyAttacker {
                sleep_for: self.sleep_for,
                calls: StdArc::clone(&self.calls),
            })
        }
    }

    #[tokio::test]
    async fn quit_stops_the_loop_without_consuming_a_pending_token() -> Result<(), String> {
        let (next_tx, next_rx) = mpsc::channel(1);
        let tokens: TokenSource = StdArc::new(TokioMutex::new(next_rx));
        let (quit_tx, quit_rx) = broadcast::channel(1);
        let (results_tx, mut results_rx) = mpsc::channel(4);
        let calls = StdArc::new(AtomicU64::new(0));
        let attacker = Box::new(SleepyAttacker {
            sleep_for: Duration::from_millis(1),
            calls: StdArc::clone(&calls),
        });
        let runner = crate::runner::Runner::new(sample_config());

        let handle = tokio::spawn(run_worker(
            "h".to_owned(),
            attacker,
            runner,
            sample_config(),
            tokens,
            quit_rx.resubscribe(),
            results_tx,
            Duration::from_secs(1),
        ));

        next_tx
            .send(())
            .await
            .map_err(|err| format!("send token failed: {err}"))?;
        let record = results_rx
            .recv()
            .await
            .ok_or_else(|| "expected one call record".to_owned())?;
        if record.result.is_failure() {
            return Err("expected a successful call".to_owned());
        }

        quit_tx
            .send(())
            .map_err(|_| "failed to broadcast quit".to_owned())?;
        drop(quit_rx);
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .map_err(|err| format!("worker did not exit after quit: {err}"))?
            .map_err(|err| format!("worker task panicked: {err}"))?;
        Ok(())
    }

    #[tokio::test]
    async fn slow_call_is_reported_as_timeout() -> Result<(), String> {
        let (next_tx, next_rx) = mpsc::channel(1);
        let tokens: TokenSource = StdArc::new(TokioMutex::new(next_rx));
        let (_quit_tx, quit_rx) = broadcast::channel(1);
        let (results_tx, mut results_rx) = mpsc::channel(4);
        let calls = StdArc::new(AtomicU64::new(0));
        let attacker: Box<dyn Attacker> = Box::new(SleepyAttacker {
            sleep_for: Duration::from_millis(50),
            calls: StdArc::clone(&calls),
        });

        next_tx
            .send(())
            .await
            .map_err(|err| format!("send token failed: {err}"))?;
        drop(next_tx);
        let runner = crate::runner::Runner::new(sample_config());
        tokio::spawn(run_worker(
            "h".to_owned(),
            attacker,
            runner,
            sample_config(),
            tokens,
            quit_rx,
            results_tx,
            Duration::from_millis(5),
        ));

        let record = tokio::time::timeout(Duration::from_millis(200), results_rx.recv())
            .await
            .map_err(|err| format!("timed out waiting for record: {err}"))?
            .ok_or_else(|| "expected one call record".to_owned())?;
        if record.result.error.as_deref() != Some(DoResult::TIMEOUT_ERROR) {
            return Err(format!("expected timeout error, got {:?}", record.result));
        }
        if record.elapsed < Duration::from_millis(5) {
            return Err("elapsed should be at least the do_timeout".to_owned());
        }
        Ok(())
    }

    struct FailsSetup;

    #[async_trait]
    impl Attacker for FailsSetup {
        async fn setup(&mut self, _config: &RunnerConfig) -> Result<(), String> {
            Err("no connection".to_owned())
        }

        async fn do_call(&mut self, _deadline: Duration) -> DoResult {
            DoResult::ok("unreachable", 200)
        }

        fn clone_for(&self, _runner: &StdArc<crate::runner::Runner>) -> Box<dyn Attacker> {
            Box::new(FailsSetup)
        }
    }

    #[tokio::test]
    async fn setup_failure_drops_the_worker_without_publishing() -> Result<(), String> {
        let (_next_tx, next_rx) = mpsc::channel(1);
        let tokens: TokenSource = StdArc::new(TokioMutex::new(next_rx));
        let (_quit_tx, quit_rx) = broadcast::channel(1);
        let (results_tx, mut results_rx) = mpsc::channel(4);

        let runner = crate::runner::Runner::new(sample_config());
        let handle = tokio::spawn(run_worker(
            "h".to_owned(),
            Box::new(FailsSetup),
            runner,
            sample_config(),
            tokens,
            quit_rx,
            results_tx,
            Duration::from_secs(1),
        ));

        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .map_err(|err| format!("worker did not exit after failed setup: {err}"))?
            .map_err(|err| format!("worker task panicked: {err}"))?;
        if results_rx.try_recv().is_ok() {
            return Err("a dropped worker must not publish any call record".to_owned());
        }
        Ok(())
    }
}
