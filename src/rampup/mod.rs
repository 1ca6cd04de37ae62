//! Ramp-up Strategist (C5, §4.4): grows the worker pool over `RampUpTimeSec`
//! according to one of two policies.

mod adaptive;
mod linear;

use crate::config::RampUpStrategy;

/// Target pool size at ramp-up `tick` under `strategy`.
///
/// For [`RampUpStrategy::Linear`], `observed_rate`/`target_rate` are ignored:
/// growth is purely a function of elapsed ticks. For
/// [`RampUpStrategy::Exp2`], `ramp_up_time_sec`/`tick` are ignored: growth is
/// purely a function of the prior tick's measured throughput.
#[must_use]
pub fn target_worker_count(
    strategy: RampUpStrategy,
    tick: u64,
    ramp_up_time_sec: u64,
    current_workers: u64,
    observed_rate: f64,
    target_rate: f64,
    max_attackers: u64,
) -> u64 {
    match strategy {
        RampUpStrategy::Linear => linear::target_worker_count(tick, ramp_up_time_sec, max_attackers),
        RampUpStrategy::Exp2 => {
            adaptive::target_worker_count(current_workers, observed_rate, target_rate, max_attackers)
        }
    }
}
