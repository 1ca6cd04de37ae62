use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Which ramp-up policy grows the worker pool during the ramp-up window
/// (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampUpStrategy {
    /// Grow the pool on a straight line toward `max_attackers`.
    Linear,
    /// Grow the pool from measured throughput, doubling per tick at most.
    Exp2,
}

impl Default for RampUpStrategy {
    fn default() -> Self {
        Self::Linear
    }
}

/// A runtime predicate the [`crate::stop::StopSupervisor`] evaluates on an
/// interval; true trips the Runner's shutdown (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopCondition {
    /// Trips when the current stage's failure ratio exceeds `threshold`.
    Error { interval_sec: u64, threshold: f64 },
    /// Trips when an externally-evaluated query (e.g. PromQL) resolves true.
    External { interval_sec: u64, query: String },
    /// Trips when a registered callback returns true.
    Custom { interval_sec: u64, name: String },
}

impl StopCondition {
    #[must_use]
    pub const fn interval_sec(&self) -> u64 {
        match self {
            Self::Error { interval_sec, .. }
            | Self::External { interval_sec, .. }
            | Self::Custom { interval_sec, .. } => *interval_sec,
        }
    }
}

/// Parameters for the validation replay described in §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationParams {
    pub attack_time_sec: u64,
    pub threshold: f64,
}

/// Declarative description of one handle's load (§3).
///
/// Immutable for the lifetime of a Run with one documented exception:
/// [`crate::runner::Runner::apply_validation_params`] mutates a subset of
/// fields in place to set up the validation replay (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub handle_name: String,
    /// Label looked up in the [`crate::registry::AttackerRegistry`] to
    /// produce this handle's attacker instances.
    pub attacker: String,
    pub rps: u64,
    pub attack_time_sec: u64,
    pub ramp_up_time_sec: u64,
    pub max_attackers: u64,
    pub do_timeout_sec: u64,
    #[serde(default)]
    pub ramp_up_strategy: RampUpStrategy,
    #[serde(default)]
    pub stop_if: Vec<StopCondition>,
    #[serde(default)]
    pub validation: Option<ValidationParams>,
    #[serde(default)]
    pub is_validation_run: bool,
    #[serde(default)]
    pub store_data: bool,
    #[serde(default)]
    pub wait_before_sec: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RunnerConfig {
    /// Checks every invariant from §3/§4.6/§9 Open Question (b).
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant. Callers that want every
    /// violation (not just the first) should call this per-handle and
    /// collect the results rather than short-circuiting on `?`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.handle_name.trim().is_empty() {
            return Err(ValidationError::HandleNameEmpty);
        }
        if self.attacker.trim().is_empty() {
            return Err(ValidationError::AttackerLabelEmpty {
                handle: self.handle_name.clone(),
            });
        }
        if self.rps < 1 {
            return Err(ValidationError::RpsTooLow { value: self.rps });
        }
        if self.attack_time_sec < 2 {
            return Err(ValidationError::AttackTimeTooShort {
                value: self.attack_time_sec,
            });
        }
        if self.ramp_up_time_sec < 1 {
            return Err(ValidationError::RampUpTimeTooShort {
                value: self.ramp_up_time_sec,
            });
        }
        if self.max_attackers < 1 {
            return Err(ValidationError::MaxAttackersTooLow {
                value: self.max_attackers,
            });
        }
        if self.do_timeout_sec < 1 {
            return Err(ValidationError::DoTimeoutTooShort {
                value: self.do_timeout_sec,
            });
        }
        if self.ramp_up_time_sec > self.attack_time_sec {
            return Err(ValidationError::RampUpExceedsAttackTime {
                ramp_up: self.ramp_up_time_sec,
                attack: self.attack_time_sec,
            });
        }
        if let Some(validation) = self.validation.as_ref() {
            if !(validation.threshold > 0.0 && validation.threshold <= 1.0) {
                return Err(ValidationError::ValidationThresholdOutOfRange {
                    value: validation.threshold,
                });
            }
            if validation.attack_time_sec < 2 {
                return Err(ValidationError::ValidationAttackTimeTooShort {
                    value: validation.attack_time_sec,
                });
            }
        }
        for (index, condition) in self.stop_if.iter().enumerate() {
            if condition.interval_sec() < 1 {
                return Err(ValidationError::StopIntervalTooShort {
                    index,
                    value: condition.interval_sec(),
                });
            }
            match condition {
                StopCondition::Error { threshold, .. } => {
                    if !(0.0..=1.0).contains(threshold) {
                        return Err(ValidationError::StopThresholdOutOfRange {
                            index,
                            value: *threshold,
                        });
                    }
                }
                StopCondition::Custom { name, .. } if name.trim().is_empty() => {
                    return Err(ValidationError::CustomStopMissingCallback { index });
                }
                StopCondition::External { query, .. } if query.trim().is_empty() => {
                    return Err(ValidationError::ExternalStopMissingQuery { index });
                }
                StopCondition::Custom { .. } | StopCondition::External { .. } => {}
            }
        }
        Ok(())
    }

    /// `RPS` at ramp-up tick `i`, clamped to at least 1 (§4.1/§4.4).
    #[must_use]
    pub fn ramp_tick_rps(&self, tick: u64) -> u64 {
        let scaled = tick.saturating_mul(self.rps);
        scaled.checked_div(self.ramp_up_time_sec.max(1)).unwrap_or(0).max(1)
    }

    /// Duration of the steady-state phase after ramp-up.
    #[must_use]
    pub const fn steady_state_sec(&self) -> u64 {
        self.attack_time_sec.saturating_sub(self.ramp_up_time_sec)
    }
}

/// Which mode a [`Step`] runs its handles in (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequence,
    SequenceValidate,
}

/// One named group of handles within a suite (§6, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub execution_mode: ExecutionMode,
    pub handles: Vec<RunnerConfig>,
}

/// Top-level suite config (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub dumptransport: bool,
    #[serde(default)]
    pub goroutines_dump: bool,
    #[serde(default = "default_http_timeout_sec")]
    pub http_timeout_sec: u64,
    pub steps: Vec<Step>,
}

const fn default_http_timeout_sec() -> u64 {
    30
}

/// Host/generator-level config (§6). Everything here describes an external
/// collaborator (metric sinks, checks) rather than core scheduling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: Option<String>,
    pub network_iface: Option<String>,
    #[serde(default)]
    pub collect_metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksConfig {
    #[serde(default = "default_handle_threshold_percent")]
    pub handle_threshold_percent: f64,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            handle_threshold_percent: default_handle_threshold_percent(),
        }
    }
}

fn default_handle_threshold_percent() -> f64 {
    1.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_encoding")]
    pub encoding: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            encoding: default_log_encoding(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_encoding() -> String {
    "console".to_owned()
}
