use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult, ConfigError};

use super::types::{GeneratorConfig, SuiteConfig};

/// Loads a suite config (steps/handles) from a YAML or JSON file (§6).
///
/// # Errors
///
/// Returns an error when the file cannot be read, parsed, or when any
/// handle fails [`super::types::RunnerConfig::validate`].
pub fn load_suite_config(path: &Path) -> AppResult<SuiteConfig> {
    let config: SuiteConfig = load_from_path(path)?;
    if config.steps.is_empty() {
        return Err(AppError::config(ConfigError::SuiteMissingSteps));
    }
    for step in &config.steps {
        if step.handles.is_empty() {
            return Err(AppError::config(ConfigError::StepMissingHandles {
                name: step.name.clone(),
            }));
        }
        let mut seen = std::collections::HashSet::new();
        for handle in &step.handles {
            if !seen.insert(handle.handle_name.clone()) {
                return Err(AppError::config(ConfigError::DuplicateHandleInStep {
                    step: step.name.clone(),
                    name: handle.handle_name.clone(),
                }));
            }
            handle.validate().map_err(|source| {
                AppError::config(ConfigError::InvalidHandle {
                    name: handle.handle_name.clone(),
                    source,
                })
            })?;
        }
    }
    Ok(config)
}

/// Loads host/generator-level config (§6): metric sinks, checks, logging.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, or when
/// `checks.handle_threshold_percent` is non-positive.
pub fn load_generator_config(path: &Path) -> AppResult<GeneratorConfig> {
    let config: GeneratorConfig = load_from_path(path)?;
    if config.checks.handle_threshold_percent <= 0.0 {
        return Err(AppError::config(ConfigError::InvalidHandleThreshold));
    }
    Ok(config)
}

fn load_from_path<T>(path: &Path) -> AppResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path).map_err(|source| {
        AppError::config(ConfigError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&content).map_err(|source| {
            AppError::config(ConfigError::ParseYaml {
                path: path.to_path_buf(),
                source,
            })
        }),
        Some("json") => serde_json::from_str(&content).map_err(|source| {
            AppError::config(ConfigError::ParseJson {
                path: path.to_path_buf(),
                source,
            })
        }),
        Some(ext) => Err(AppError::config(ConfigError::UnsupportedExtension {
            ext: ext.to_owned(),
        })),
        None => Err(AppError::config(ConfigError::MissingExtension)),
    }
}

#[must_use]
pub fn default_scaling_csv_path() -> PathBuf {
    PathBuf::from("scaling.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn loads_minimal_suite_yaml() -> Result<(), String> {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml")
            .map_err(|err| format!("failed to create temp file: {err}"))?;
        writeln!(
            file,
            "steps:\n  - name: smoke\n    execution_mode: parallel\n    handles:\n      - handle_name: login\n        attacker: http\n        rps: 10\n        attack_time_sec: 4\n        ramp_up_time_sec: 2\n        max_attackers: 4\n        do_timeout_sec: 1\n"
        )
        .map_err(|err| format!("failed to write temp file: {err}"))?;
        let config =
            load_suite_config(file.path()).map_err(|err| format!("expected config: {err}"))?;
        if config.steps.len() != 1 {
            return Err("expected exactly one step".to_owned());
        }
        if config.steps[0].handles[0].rps != 10 {
            return Err("expected rps to round-trip".to_owned());
        }
        Ok(())
    }

    #[test]
    fn rejects_suite_with_no_steps() -> Result<(), String> {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml")
            .map_err(|err| format!("failed to create temp file: {err}"))?;
        writeln!(file, "steps: []").map_err(|err| format!("failed to write: {err}"))?;
        if load_suite_config(file.path()).is_ok() {
            return Err("expected empty suite to be rejected".to_owned());
        }
        Ok(())
    }
}
