//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Settings for one monitoring run.
///
/// Replaced wholesale on reconfiguration; never mutated while a run uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Log file to tail.
    #[serde(default)]
    pub file_path: PathBuf,
    /// Period of the interval change source, and of the polling fallback.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Use OS notifications instead of the interval timer.
    #[serde(default = "default_use_notification_watcher")]
    pub use_notification_watcher: bool,
    /// Delay before a failed notification watcher is recreated.
    #[serde(default = "default_watcher_restart_delay_ms")]
    pub watcher_restart_delay_ms: u64,
    /// Consecutive watcher creation failures before falling back to polling.
    #[serde(default = "default_watcher_max_restarts")]
    pub watcher_max_restarts: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_use_notification_watcher() -> bool {
    true
}

fn default_watcher_restart_delay_ms() -> u64 {
    1000
}

fn default_watcher_max_restarts() -> u32 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::new(),
            poll_interval_ms: default_poll_interval_ms(),
            use_notification_watcher: default_use_notification_watcher(),
            watcher_restart_delay_ms: default_watcher_restart_delay_ms(),
            watcher_max_restarts: default_watcher_max_restarts(),
        }
    }
}

impl MonitorConfig {
    /// Default configuration for `file_path`.
    #[must_use]
    pub fn for_path(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    /// Check that the configuration can start a monitoring run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPath`] for an empty file path and
    /// [`ConfigError::ZeroPollInterval`] for a zero poll interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::default();
        assert!(config.file_path.as_os_str().is_empty());
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.use_notification_watcher);
        assert_eq!(config.watcher_restart_delay_ms, 1000);
        assert_eq!(config.watcher_max_restarts, 5);
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let config = MonitorConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyPath)));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = MonitorConfig {
            poll_interval_ms: 0,
            ..MonitorConfig::for_path("/logs/game.log")
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroPollInterval)
        ));
    }

    #[test]
    fn test_validate_accepts_path() {
        let config = MonitorConfig::for_path("/logs/game.log");
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_monitor_config_deserialize() {
        let toml = r#"
            file_path = "/games/logs/script.log"
            poll_interval_ms = 250
            use_notification_watcher = false
        "#;
        let config: MonitorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.file_path, PathBuf::from("/games/logs/script.log"));
        assert_eq!(config.poll_interval_ms, 250);
        assert!(!config.use_notification_watcher);
        assert_eq!(config.watcher_max_restarts, 5);
    }
}
