//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::MonitorConfig;

/// File name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".dumpwatch.toml";

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .dumpwatch.toml
        search_paths.push(PathBuf::from(LOCAL_CONFIG_FILE));

        // 2. User config directory: ~/.config/dumpwatch/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("dumpwatch").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<MonitorConfig, ConfigError> {
        if let Some(path) = self.find_config_file() {
            tracing::debug!(path = %path.display(), "Loading config file");
            return Self::load_from_path(&path);
        }

        tracing::debug!("No config file found, using defaults");
        Ok(MonitorConfig::default())
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> Result<MonitorConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Log file path must not be empty")]
    EmptyPath,

    #[error("Poll interval must be greater than zero")]
    ZeroPollInterval,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_loader_default_paths() {
        let loader = ConfigLoader::new();
        assert!(!loader.search_paths().is_empty());
        assert!(loader.search_paths()[0].ends_with(LOCAL_CONFIG_FILE));
    }

    #[test]
    fn test_config_loader_returns_defaults_when_no_file() {
        let loader = ConfigLoader::with_path(PathBuf::from("/nonexistent/path.toml"));
        let config = loader.load().unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert!(loader.find_config_file().is_none());
    }

    #[test]
    fn test_config_loader_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "file_path = \"/games/script.log\"").unwrap();
        writeln!(file, "poll_interval_ms = 500").unwrap();
        file.flush().unwrap();

        let loader = ConfigLoader::with_path(file.path().to_path_buf());
        let config = loader.load().unwrap();
        assert_eq!(config.file_path, PathBuf::from("/games/script.log"));
        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.use_notification_watcher);
        assert_eq!(loader.find_config_file(), Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_config_loader_reports_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = \"fast\"").unwrap();
        file.flush().unwrap();

        let loader = ConfigLoader::with_path(file.path().to_path_buf());
        let err = loader.load().unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ConfigError::EmptyPath.to_string(),
            "Log file path must not be empty"
        );
        assert_eq!(
            ConfigError::ZeroPollInterval.to_string(),
            "Poll interval must be greater than zero"
        );
    }
}
