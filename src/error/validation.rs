use thiserror::Error;

/// Configuration errors produced by [`crate::config::RunnerConfig::validate`].
///
/// These are always fatal before a run starts: the caller is expected to
/// collect every message produced across a suite and print them all before
/// exiting, rather than stopping at the first one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rps must be >= 1, got {value}")]
    RpsTooLow { value: u64 },
    #[error("attack_time_sec must be >= 2, got {value}")]
    AttackTimeTooShort { value: u64 },
    #[error("ramp_up_time_sec must be >= 1, got {value}")]
    RampUpTimeTooShort { value: u64 },
    #[error("max_attackers must be >= 1, got {value}")]
    MaxAttackersTooLow { value: u64 },
    #[error("do_timeout_sec must be >= 1, got {value}")]
    DoTimeoutTooShort { value: u64 },
    #[error("ramp_up_time_sec ({ramp_up}) must be <= attack_time_sec ({attack})")]
    RampUpExceedsAttackTime { ramp_up: u64, attack: u64 },
    #[error("handle_name must not be empty")]
    HandleNameEmpty,
    #[error("handle '{handle}' must name a registered attacker")]
    AttackerLabelEmpty { handle: String },
    #[error("validation.threshold must be in (0, 1], got {value}")]
    ValidationThresholdOutOfRange { value: f64 },
    #[error("validation.attack_time_sec must be >= 2, got {value}")]
    ValidationAttackTimeTooShort { value: u64 },
    #[error("stop_if[{index}].interval_sec must be >= 1, got {value}")]
    StopIntervalTooShort { index: usize, value: u64 },
    #[error("stop_if[{index}].threshold must be in [0, 1], got {value}")]
    StopThresholdOutOfRange { index: usize, value: f64 },
    #[error("stop_if[{index}] of kind 'custom' requires a registered callback name")]
    CustomStopMissingCallback { index: usize },
    #[error("stop_if[{index}] of kind 'external' requires a query string")]
    ExternalStopMissingQuery { index: usize },
}
