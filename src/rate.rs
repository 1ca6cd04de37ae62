//! Leaky-bucket token producer (§4.1).
//!
//! A [`RateLimiter`] is built fresh for each ramp-up second and once for
//! steady state, so that a change in target RPS between ticks is bit-exact
//! rather than smoothed. The first `take` on a fresh limiter returns
//! immediately; the Runner compensates for that bias by issuing one extra
//! `take` per ramp-up second (§4.1).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Emits one permit per `1/rps` second at sub-millisecond resolution.
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    driver: JoinHandle<()>,
}

impl RateLimiter {
    /// `rps` is clamped to at least 1 (§4.1: the ramp-up formula may round to
    /// 0, and a limiter must always make forward progress).
    #[must_use]
    pub fn new(rps: u64) -> Self {
        let rps = rps.max(1);
        let permits = Arc::new(Semaphore::new(1));
        let period = Duration::from_secs_f64(1.0 / rps as f64);
        let driver_permits = Arc::clone(&permits);
        let driver = tokio::spawn(async move {
            let mut tick = interval(period.max(Duration::from_micros(1)));
            tick.tick().await;
            loop {
                tick.tick().await;
                driver_permits.add_permits(1);
            }
        });
        Self { permits, driver }
    }

    /// Awaits the next token. Returns no earlier than `k * (1/rps)` after the
    /// `k`-th call on this limiter.
    ///
    /// # Panics
    ///
    /// Never: the internal semaphore is closed only when `self` is dropped,
    /// and this method borrows `self`.
    pub async fn take(&self) {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("rate limiter semaphore is never closed while `self` is alive");
        permit.forget();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn first_take_is_immediate() -> Result<(), String> {
        let limiter = RateLimiter::new(1);
        let started = Instant::now();
        tokio::time::timeout(Duration::from_millis(50), limiter.take())
            .await
            .map_err(|err| format!("first take should not block: {err}"))?;
        if started.elapsed() >= Duration::from_millis(50) {
            return Err("first take blocked longer than expected".to_owned());
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn take_paces_tokens_at_target_rate() -> Result<(), String> {
        let limiter = RateLimiter::new(10);
        limiter.take().await;
        let started = Instant::now();
        for _ in 0..5 {
            limiter.take().await;
        }
        let elapsed = started.elapsed();
        if elapsed < Duration::from_millis(450) {
            return Err(format!("5 tokens at 10rps arrived too fast: {elapsed:?}"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn zero_rps_is_clamped_to_one() -> Result<(), String> {
        let limiter = RateLimiter::new(0);
        tokio::time::timeout(Duration::from_millis(50), limiter.take())
            .await
            .map_err(|err| format!("rps=0 should behave like rps=1: {err}"))?;
        Ok(())
    }
}
