use std::path::PathBuf;
use thiserror::Error;

use super::ValidationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config '{path}': {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .yaml, .yml, or .json.")]
    UnsupportedExtension { ext: String },
    #[error("Config file must have a .yaml, .yml, or .json extension.")]
    MissingExtension,
    #[error("Suite must declare at least one step.")]
    SuiteMissingSteps,
    #[error("Step '{name}' must declare at least one handle.")]
    StepMissingHandles { name: String },
    #[error("Duplicate handle name '{name}' within step '{step}'.")]
    DuplicateHandleInStep { step: String, name: String },
    #[error("Handle '{name}' failed validation: {source}")]
    InvalidHandle {
        name: String,
        #[source]
        source: ValidationError,
    },
    #[error("checks.handle_threshold_percent must be > 0.")]
    InvalidHandleThreshold,
    #[error("no attacker is registered for label '{label}'")]
    UnknownAttackerLabel { label: String },
}
