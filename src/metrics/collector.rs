//! Single-consumer fan-in: one task owns the results channel and folds each
//! [`CallRecord`] into per-label [`Metrics`], removing the need for
//! fine-grained locking inside the aggregator (§4.3).

use std::collections::HashMap;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::types::{LabelSnapshot, Metrics};
use crate::worker::CallRecord;

/// Label -> point-in-time snapshot. Cloned on every publish; cheap because a
/// [`LabelSnapshot`] holds no unbounded data beyond the capped error list.
pub type Snapshot = HashMap<String, LabelSnapshot>;

/// Events the collector consumes. `RampTickBoundary` is sent by the ramp-up
/// strategist once per simulated second so the collector can publish a
/// second-scoped view as `RampUpMetrics` and start a fresh window, while the
/// lifetime aggregate keeps growing undisturbed (§4.4).
pub enum PipelineEvent {
    Call(CallRecord),
    RampTickBoundary,
}

/// Handle to a running collector task.
pub struct Collector {
    pub events_tx: mpsc::Sender<PipelineEvent>,
    pub lifetime_rx: watch::Receiver<Snapshot>,
    pub ramp_rx: watch::Receiver<Snapshot>,
    join: JoinHandle<Snapshot>,
}

impl Collector {
    /// Awaits the collector task draining its channel after `events_tx`
    /// (and every clone of it) has been dropped, and returns the final
    /// lifetime snapshot for report building.
    ///
    /// # Errors
    ///
    /// Returns an error if the collector task panicked.
    pub async fn finish(self) -> Result<Snapshot, tokio::task::JoinError> {
        self.join.await
    }
}

/// Spawns the collector task. `capacity` bounds the events channel.
#[must_use]
pub fn spawn(capacity: usize) -> Collector {
    let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
    let (lifetime_tx, lifetime_rx) = watch::channel(Snapshot::new());
    let (ramp_tx, ramp_rx) = watch::channel(Snapshot::new());

    let join = tokio::spawn(run(events_rx, lifetime_tx, ramp_tx));

    Collector {
        events_tx,
        lifetime_rx,
        ramp_rx,
        join,
    }
}

async fn run(
    mut events_rx: mpsc::Receiver<PipelineEvent>,
    lifetime_tx: watch::Sender<Snapshot>,
    ramp_tx: watch::Sender<Snapshot>,
) -> Snapshot {
    let mut lifetime: HashMap<String, Metrics> = HashMap::new();
    let mut window: HashMap<String, Metrics> = HashMap::new();

    while let Some(event) = events_rx.recv().await {
        match event {
            PipelineEvent::Call(record) => {
                let label = record.result.request_label.clone();
                let elapsed_ms = u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX);
                let is_failure = record.result.is_failure();
                let error = record.result.error.as_deref();

                if let Err(err) = fold_into(&mut lifetime, &label, is_failure, error, elapsed_ms,
                    record.begin, record.end)
                {
                    tracing::error!(label = %label, error = %err, "failed to record lifetime metric");
                }
                if let Err(err) = fold_into(&mut window, &label, is_failure, error, elapsed_ms,
                    record.begin, record.end)
                {
                    tracing::error!(label = %label, error = %err, "failed to record window metric");
                }

                let snapshot = build_snapshot(&lifetime);
                drop(lifetime_tx.send(snapshot));
            }
            PipelineEvent::RampTickBoundary => {
                drop(ramp_tx.send(build_snapshot(&window)));
                window.clear();
            }
        }
    }

    build_snapshot(&lifetime)
}

#[expect(clippy::too_many_arguments)]
fn fold_into(
    map: &mut HashMap<String, Metrics>,
    label: &str,
    is_failure: bool,
    error: Option<&str>,
    elapsed_ms: u64,
    begin: tokio::time::Instant,
    end: tokio::time::Instant,
) -> Result<(), String> {
    if !map.contains_key(label) {
        map.insert(label.to_owned(), Metrics::new()?);
    }
    let entry = map
        .get_mut(label)
        .ok_or_else(|| "metrics entry missing immediately after insert".to_owned())?;
    entry.record(is_failure, error, elapsed_ms, begin, end)
}

fn build_snapshot(map: &HashMap<String, Metrics>) -> Snapshot {
    map.iter()
        .map(|(label, metrics)| (label.clone(), metrics.snapshot()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attacker::DoResult;
    use std::time::Duration;
    use tokio::time::Instant;

    fn record(label: &str, failed: bool) -> CallRecord {
        let begin = Instant::now();
        CallRecord {
            result: if failed {
                DoResult::failed(label, "boom")
            } else {
                DoResult::ok(label, 200)
            },
            begin,
            end: begin + Duration::from_millis(5),
            elapsed: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn lifetime_snapshot_accumulates_across_ramp_ticks() -> Result<(), String> {
        let collector = spawn(8);
        collector
            .events_tx
            .send(PipelineEvent::Call(record("login", false)))
            .await
            .map_err(|err| format!("send failed: {err}"))?;
        collector
            .events_tx
            .send(PipelineEvent::RampTickBoundary)
            .await
            .map_err(|err| format!("send failed: {err}"))?;
        collector
            .events_tx
            .send(PipelineEvent::Call(record("login", true)))
            .await
            .map_err(|err| format!("send failed: {err}"))?;

        let mut lifetime_rx = collector.lifetime_rx.clone();
        lifetime_rx
            .changed()
            .await
            .map_err(|err| format!("watch closed: {err}"))?;
        lifetime_rx
            .changed()
            .await
            .map_err(|err| format!("watch closed: {err}"))?;

        drop(collector.events_tx);
        let finished = collector
            .finish()
            .await
            .map_err(|err| format!("collector task panicked: {err}"))?;
        let login = finished
            .get("login")
            .ok_or_else(|| "missing login label".to_owned())?;
        if login.requests != 2 || login.failures != 1 {
            return Err(format!("unexpected aggregate: {login:?}"));
        }
        Ok(())
    }
}
