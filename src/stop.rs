//! Stop-Condition Supervisor (C7, §4.7): evaluates a predicate on an
//! interval; on true it reports a trip so the Runner can shut down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::time::{MissedTickBehavior, interval};

use crate::config::StopCondition;
use crate::error::StopError;
use crate::metrics::Snapshot;

/// Which phase of the Run is currently live, so the error-ratio condition
/// reads the right metrics (§9 Open Question (a): use steady metrics during
/// steady state, not the ramp-up window, regardless of which is more
/// recently touched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStage {
    RampUp,
    SteadyState,
}

/// Result of an externally-evaluated stop query (§6 `StopQuery`).
#[derive(Debug, Clone)]
pub enum ExternalResult {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// A user-provided evaluator for `external` stop conditions (e.g. PromQL).
#[async_trait]
pub trait StopQuery: Send + Sync {
    async fn evaluate(&self, query: &str) -> Result<ExternalResult, String>;
}

/// A registered `custom` stop condition predicate.
pub type CustomStop = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// Why the supervisor tripped, surfaced to the Runner for `RunError`/report
/// purposes.
#[derive(Debug, Clone)]
pub struct StopTrip {
    pub handle: String,
    pub reason: String,
}

/// Handle to a running supervisor; dropping it (or all its `StopCondition`s
/// evaluating false forever) leaves the task parked on its intervals until
/// the Runner drops the handle, at which point the task is aborted by the
/// Runner's shutdown path.
pub struct Supervisor {
    pub tripped: oneshot::Receiver<StopTrip>,
    join: tokio::task::JoinHandle<()>,
}

impl Supervisor {
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Spawns one task per [`StopCondition`] (§4.7: "Every `Checks[0].Interval`
/// seconds, evaluates a predicate"); the first to trip sends on a shared
/// single-shot channel, which is the idempotent cancellation signal (only one
/// send ever succeeds; the rest observe a closed receiver and exit quietly).
#[must_use]
pub fn spawn(
    handle: String,
    conditions: Vec<StopCondition>,
    stage_rx: watch::Receiver<TestStage>,
    lifetime_rx: watch::Receiver<Snapshot>,
    ramp_rx: watch::Receiver<Snapshot>,
    external: Option<Arc<dyn StopQuery>>,
    custom: HashMap<String, CustomStop>,
) -> Supervisor {
    let (trip_tx, trip_rx) = oneshot::channel();
    let trip_tx = Arc::new(std::sync::Mutex::new(Some(trip_tx)));

    let join = tokio::spawn(async move {
        let tasks: Vec<_> = conditions
            .into_iter()
            .map(|condition| {
                tokio::spawn(watch_condition(
                    handle.clone(),
                    condition,
                    stage_rx.clone(),
                    lifetime_rx.clone(),
                    ramp_rx.clone(),
                    external.clone(),
                    custom.clone(),
                    Arc::clone(&trip_tx),
                ))
            })
            .collect();
        for task in tasks {
            drop(task.await);
        }
    });

    Supervisor {
        tripped: trip_rx,
        join,
    }
}

#[expect(clippy::too_many_arguments)]
async fn watch_condition(
    handle: String,
    condition: StopCondition,
    mut stage_rx: watch::Receiver<TestStage>,
    lifetime_rx: watch::Receiver<Snapshot>,
    ramp_rx: watch::Receiver<Snapshot>,
    external: Option<Arc<dyn StopQuery>>,
    custom: HashMap<String, CustomStop>,
    trip_tx: Arc<std::sync::Mutex<Option<oneshot::Sender<StopTrip>>>>,
) {
    let mut tick = interval(Duration::from_secs(condition.interval_sec().max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        let tripped = match &condition {
            StopCondition::Error { threshold, .. } => {
                let stage = *stage_rx.borrow_and_update();
                let snapshot = match stage {
                    TestStage::RampUp => ramp_rx.borrow().clone(),
                    TestStage::SteadyState => lifetime_rx.borrow().clone(),
                };
                error_ratio_exceeds(&snapshot, &handle, *threshold)
            }
            StopCondition::External { query, .. } => {
                match evaluate_external(external.as_deref(), query).await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(handle = %handle, error = %err, "external stop query failed");
                        false
                    }
                }
            }
            StopCondition::Custom { name, .. } => {
                let snapshot = lifetime_rx.borrow().clone();
                match custom.get(name) {
                    Some(predicate) => predicate(&snapshot),
                    None => {
                        tracing::error!(handle = %handle, name = %name, "custom stop callback is not registered");
                        false
                    }
                }
            }
        };

        if tripped {
            let mut guard = match trip_tx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(sender) = guard.take() {
                drop(sender.send(StopTrip {
                    handle: handle.clone(),
                    reason: describe(&condition),
                }));
            }
            return;
        }
    }
}

fn error_ratio_exceeds(snapshot: &Snapshot, handle: &str, threshold: f64) -> bool {
    snapshot
        .get(handle)
        .is_some_and(|label| label.stats.success_ratio > threshold)
}

async fn evaluate_external(
    external: Option<&dyn StopQuery>,
    query: &str,
) -> Result<bool, StopError> {
    let Some(evaluator) = external else {
        return Err(StopError::QueryFailed {
            query: query.to_owned(),
            message: "no StopQuery evaluator configured".to_owned(),
        });
    };
    let result = evaluator
        .evaluate(query)
        .await
        .map_err(|message| StopError::QueryFailed {
            query: query.to_owned(),
            message,
        })?;
    match result {
        ExternalResult::Scalar(value) => Ok((value - 1.0).abs() < f64::EPSILON),
        ExternalResult::Vector(values) if values.len() == 1 => {
            let value = values.first().copied().unwrap_or(0.0);
            Ok((value - 1.0).abs() < f64::EPSILON)
        }
        ExternalResult::Vector(values) if values.is_empty() => Ok(false),
        ExternalResult::Vector(values) => Err(StopError::AmbiguousVectorResult {
            query: query.to_owned(),
            len: values.len(),
        }),
    }
}

fn describe(condition: &StopCondition) -> String {
    match condition {
        StopCondition::Error { threshold, .. } => {
            format!("error ratio exceeded threshold {threshold}")
        }
        StopCondition::External { query, .. } => format!("external query '{query}' resolved true"),
        StopCondition::Custom { name, .. } => format!("custom callback '{name}' returned true"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::LabelSnapshot;
    use std::collections::HashMap as StdHashMap;

    fn snapshot_with_ratio(handle: &str, ratio: f64) -> Snapshot {
        let mut label = LabelSnapshot::default();
        label.stats.success_ratio = ratio;
        let mut map = StdHashMap::new();
        map.insert(handle.to_owned(), label);
        map
    }

    #[tokio::test]
    async fn error_ratio_condition_trips_when_threshold_exceeded() -> Result<(), String> {
        let (stage_tx, stage_rx) = watch::channel(TestStage::SteadyState);
        let (lifetime_tx, lifetime_rx) = watch::channel(Snapshot::new());
        let (_ramp_tx, ramp_rx) = watch::channel(Snapshot::new());
        let supervisor = spawn(
            "login".to_owned(),
            vec![StopCondition::Error {
                interval_sec: 1,
                threshold: 0.1,
            }],
            stage_rx,
            lifetime_rx,
            ramp_rx,
            None,
            StdHashMap::new(),
        );

        lifetime_tx
            .send(snapshot_with_ratio("login", 0.9))
            .map_err(|_| "failed to publish snapshot".to_owned())?;
        drop(stage_tx);

        let trip = tokio::time::timeout(Duration::from_secs(3), supervisor.tripped)
            .await
            .map_err(|err| format!("supervisor did not trip in time: {err}"))?
            .map_err(|err| format!("trip channel closed unexpectedly: {err}"))?;
        if trip.handle != "login" {
            return Err("trip should be attributed to the tripped handle".to_owned());
        }
        Ok(())
    }
}
