//! Per-label metric aggregation (§3, §4.3).

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::histogram::LatencyHistogram;

/// Errors are retained up to this many entries per label; beyond that the
/// count keeps growing but the sample list is capped so a pathological run
/// cannot grow `RunReport` without bound.
const MAX_RETAINED_ERRORS: usize = 20;

/// Derived statistics snapshotted from a [`Metrics`] at report time.
///
/// `success_ratio` keeps the spec's historical name even though it is
/// computed as a *failure* ratio (§9 Open Question (c); §4.3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub latest_ms: u64,
    pub min_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
    pub rate: f64,
    pub success_ratio: f64,
}

/// Accumulates requests for one `RequestLabel` as call records arrive,
/// one-at-a-time, from the single-consumer collector (§4.3).
#[derive(Debug)]
pub struct Metrics {
    requests: u64,
    successes: u64,
    failures: u64,
    errors: Vec<String>,
    latencies: LatencyHistogram,
    latest_ms: u64,
    first_begin: Option<Instant>,
    last_end: Option<Instant>,
}

impl Metrics {
    /// # Errors
    ///
    /// Returns an error if the internal latency histogram cannot be created.
    pub fn new() -> Result<Self, String> {
        Ok(Self {
            requests: 0,
            successes: 0,
            failures: 0,
            errors: Vec::new(),
            latencies: LatencyHistogram::new()?,
            latest_ms: 0,
            first_begin: None,
            last_end: None,
        })
    }

    /// Folds one call record into the running aggregate.
    ///
    /// # Errors
    ///
    /// Returns an error if the latency sample cannot be recorded.
    pub fn record(
        &mut self,
        is_failure: bool,
        error: Option<&str>,
        elapsed_ms: u64,
        begin: Instant,
        end: Instant,
    ) -> Result<(), String> {
        self.requests = self.requests.saturating_add(1);
        if is_failure {
            self.failures = self.failures.saturating_add(1);
            if let Some(error) = error
                && self.errors.len() < MAX_RETAINED_ERRORS
            {
                self.errors.push(error.to_owned());
            }
        } else {
            self.successes = self.successes.saturating_add(1);
        }
        self.latest_ms = elapsed_ms;
        self.latencies.record(elapsed_ms)?;
        self.first_begin = Some(self.first_begin.map_or(begin, |first| first.min(begin)));
        self.last_end = Some(self.last_end.map_or(end, |last| last.max(end)));
        Ok(())
    }

    /// Merges another label's aggregate into this one (used when folding a
    /// ramp-up second's scoped metrics back into the lifetime aggregate, and
    /// when the validation replay resets counters).
    ///
    /// # Errors
    ///
    /// Returns an error if the latency histograms cannot be merged.
    pub fn merge(&mut self, other: &Self) -> Result<(), String> {
        self.requests = self.requests.saturating_add(other.requests);
        self.successes = self.successes.saturating_add(other.successes);
        self.failures = self.failures.saturating_add(other.failures);
        for error in &other.errors {
            if self.errors.len() >= MAX_RETAINED_ERRORS {
                break;
            }
            self.errors.push(error.clone());
        }
        self.latencies.merge(&other.latencies)?;
        if other.latest_ms > 0 {
            self.latest_ms = other.latest_ms;
        }
        if let Some(begin) = other.first_begin {
            self.first_begin = Some(self.first_begin.map_or(begin, |first| first.min(begin)));
        }
        if let Some(end) = other.last_end {
            self.last_end = Some(self.last_end.map_or(end, |last| last.max(end)));
        }
        Ok(())
    }

    #[must_use]
    pub const fn requests(&self) -> u64 {
        self.requests
    }

    #[must_use]
    pub const fn successes(&self) -> u64 {
        self.successes
    }

    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.failures
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// `SuccessRatio` per §4.3: the *failure* ratio, kept under its spec name.
    #[must_use]
    pub fn success_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }

    /// `Rate = Requests / (last.end − first.begin)` (§3).
    #[must_use]
    pub fn rate(&self) -> f64 {
        match (self.first_begin, self.last_end) {
            (Some(first), Some(last)) => {
                let elapsed = last.saturating_duration_since(first).as_secs_f64();
                if elapsed > 0.0 {
                    self.requests as f64 / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn stats(&self) -> LatencyStats {
        let (p50, p95, p99) = self.latencies.percentiles();
        LatencyStats {
            latest_ms: self.latest_ms,
            min_ms: self.latencies.min(),
            mean_ms: self.latencies.mean(),
            p50_ms: p50,
            p95_ms: p95,
            p99_ms: p99,
            max_ms: self.latencies.max(),
            rate: self.rate(),
            success_ratio: self.success_ratio(),
        }
    }

    /// A serializable point-in-time view, suitable for publishing over a
    /// watch channel or embedding in a [`crate::report::RunReport`].
    #[must_use]
    pub fn snapshot(&self) -> LabelSnapshot {
        LabelSnapshot {
            requests: self.requests,
            successes: self.successes,
            failures: self.failures,
            errors: self.errors.clone(),
            stats: self.stats(),
        }
    }
}

/// A cloneable, serializable snapshot of one label's [`Metrics`] (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub errors: Vec<String>,
    pub stats: LatencyStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tracks_success_and_failure_counts() -> Result<(), String> {
        let mut metrics = Metrics::new()?;
        let t0 = Instant::now();
        metrics.record(false, None, 10, t0, t0 + Duration::from_millis(10))?;
        metrics.record(true, Some("boom"), 20, t0, t0 + Duration::from_millis(30))?;
        if metrics.requests() != 2 || metrics.successes() != 1 || metrics.failures() != 1 {
            return Err("counts did not add up".to_owned());
        }
        if (metrics.success_ratio() - 0.5).abs() > f64::EPSILON {
            return Err("success_ratio should be 0.5".to_owned());
        }
        Ok(())
    }

    #[test]
    fn merge_combines_two_windows() -> Result<(), String> {
        let mut a = Metrics::new()?;
        let mut b = Metrics::new()?;
        let t0 = Instant::now();
        a.record(false, None, 5, t0, t0 + Duration::from_millis(5))?;
        b.record(false, None, 15, t0, t0 + Duration::from_millis(15))?;
        a.merge(&b)?;
        if a.requests() != 2 {
            return Err("merge should add request counts".to_owned());
        }
        Ok(())
    }
}
