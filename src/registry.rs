//! Dynamic attacker factory by string name (Design Notes: replaces the
//! source's generated switch-by-label with a runtime map populated at
//! startup).

use std::collections::HashMap;
use std::sync::Arc;

use crate::attacker::AttackerFactory;
use crate::error::{AppError, ConfigError};

/// Maps a handle's attacker label to the constructor that produces a fresh
/// instance bound to a Runner.
#[derive(Clone, Default)]
pub struct AttackerRegistry {
    factories: HashMap<String, AttackerFactory>,
}

impl AttackerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, label: impl Into<String>, factory: AttackerFactory) {
        self.factories.insert(label.into(), factory);
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedExtension`]-adjacent validation
    /// error when `label` has no registered factory.
    pub fn get(&self, label: &str) -> Result<&AttackerFactory, AppError> {
        self.factories.get(label).ok_or_else(|| {
            AppError::config(ConfigError::UnknownAttackerLabel {
                label: label.to_owned(),
            })
        })
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.factories.contains_key(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attacker::{Attacker, DoResult};
    use crate::config::RunnerConfig;
    use crate::runner::Runner;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Noop;

    #[async_trait]
    impl Attacker for Noop {
        async fn do_call(&mut self, _deadline: Duration) -> DoResult {
            DoResult::ok("noop", 200)
        }

        fn clone_for(&self, _runner: &Arc<Runner>) -> Box<dyn Attacker> {
            Box::new(Noop)
        }
    }

    #[test]
    fn unregistered_label_is_a_config_error() {
        let registry = AttackerRegistry::new();
        assert!(registry.get("missing").is_err());
    }

    #[test]
    fn registered_label_resolves() -> Result<(), String> {
        let mut registry = AttackerRegistry::new();
        registry.register(
            "noop",
            Arc::new(|_config: &RunnerConfig, _runner: &Arc<Runner>| -> Box<dyn Attacker> { Box::new(Noop) }),
        );
        if !registry.contains("noop") {
            return Err("expected label to be registered".to_owned());
        }
        registry
            .get("noop")
            .map_err(|err| format!("lookup failed: {err}"))?;
        Ok(())
    }
}
