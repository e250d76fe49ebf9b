//! Coordinator settings, built from the `[coordinator]` section of a loaded
//! config file or from defaults.

use servitor_config::{Config, CoordinatorSection};

/// Runtime settings of a [`LifecycleCoordinator`](crate::LifecycleCoordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Undo a bind whose host process could not be launched.
    pub rollback_bind_on_launch_failure: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            rollback_bind_on_launch_failure: true,
        }
    }
}

impl CoordinatorConfig {
    /// Set whether failed binds are rolled back.
    #[must_use]
    pub fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback_bind_on_launch_failure = rollback;
        self
    }
}

impl From<&CoordinatorSection> for CoordinatorConfig {
    fn from(section: &CoordinatorSection) -> Self {
        Self {
            rollback_bind_on_launch_failure: section.rollback_bind_on_launch_failure,
        }
    }
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        Self::from(&config.coordinator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        assert_eq!(
            CoordinatorConfig::from(&Config::default()),
            CoordinatorConfig::default()
        );
    }

    #[test]
    fn test_from_section() {
        let section = CoordinatorSection {
            rollback_bind_on_launch_failure: false,
        };
        assert!(!CoordinatorConfig::from(&section).rollback_bind_on_launch_failure);
    }
}
