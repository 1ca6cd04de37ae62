mod loader;
mod types;

pub use loader::{default_scaling_csv_path, load_generator_config, load_suite_config};
pub use types::{
    ChecksConfig, ExecutionMode, GeneratorConfig, HostConfig, LoggingConfig, RampUpStrategy,
    RunnerConfig, Step, StopCondition, SuiteConfig, ValidationParams,
};
