//! Engine configuration
//!
//! Loaded from a JSON file. Every field is optional and falls back to the
//! defaults below.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;
use crate::store::CleanupPolicy;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Max idle age of never-resumed queries (default 1h)
    #[serde(default = "default_unused_max_age")]
    pub unused_max_age_secs: u64,

    /// Max idle age of resumed queries (default 1d)
    #[serde(default = "default_used_max_age")]
    pub used_max_age_secs: u64,

    /// Minimum gap between opportunistic cleanups (default 5m)
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
}

fn default_unused_max_age() -> u64 {
    3600
}
fn default_used_max_age() -> u64 {
    86400
}
fn default_min_interval() -> u64 {
    300
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            unused_max_age_secs: default_unused_max_age(),
            used_max_age_secs: default_used_max_age(),
            min_interval_secs: default_min_interval(),
        }
    }
}

impl From<&CleanupConfig> for CleanupPolicy {
    fn from(config: &CleanupConfig) -> Self {
        CleanupPolicy::new(
            Duration::seconds(config.unused_max_age_secs as i64),
            Duration::seconds(config.used_max_age_secs as i64),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the persisted query file; absent means in-memory only
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Page size used when a caller does not pick one (default 50)
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Lowest severity written to the log (default "INFO")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_page_size() -> usize {
    50
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            cleanup: CleanupConfig::default(),
            default_page_size: default_page_size(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::Invalid("default_page_size must be positive".into()));
        }
        self.log_severity()?;
        if self.cleanup.used_max_age_secs < self.cleanup.unused_max_age_secs {
            return Err(ConfigError::Invalid(format!(
                "cleanup.used_max_age_secs ({}) is shorter than cleanup.unused_max_age_secs ({})",
                self.cleanup.used_max_age_secs, self.cleanup.unused_max_age_secs
            )));
        }
        Ok(())
    }

    pub fn log_severity(&self) -> Result<Severity, ConfigError> {
        self.log_level.parse::<Severity>().map_err(ConfigError::Invalid)
    }

    pub fn cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy::from(&self.cleanup)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::seconds(self.cleanup.min_interval_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_from_empty_object() {
        let file = write_config("{}");
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cleanup_policy(), CleanupPolicy::default());
        assert_eq!(config.log_severity().unwrap(), Severity::Info);
    }

    #[test]
    fn test_partial_cleanup_section() {
        let file = write_config(r#"{"cleanup": {"unused_max_age_secs": 21600}, "log_level": "trace"}"#);
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.cleanup.unused_max_age_secs, 21600);
        assert_eq!(config.cleanup.used_max_age_secs, 86400);
        assert_eq!(config.log_severity().unwrap(), Severity::Trace);
        assert_eq!(
            config.cleanup_policy(),
            CleanupPolicy::new(Duration::hours(6), Duration::days(1))
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        let zero_page = write_config(r#"{"default_page_size": 0}"#);
        assert!(matches!(
            EngineConfig::load(zero_page.path()),
            Err(ConfigError::Invalid(_))
        ));

        let bad_level = write_config(r#"{"log_level": "chatty"}"#);
        assert!(matches!(
            EngineConfig::load(bad_level.path()),
            Err(ConfigError::Invalid(_))
        ));

        let inverted = write_config(
            r#"{"cleanup": {"unused_max_age_secs": 7200, "used_max_age_secs": 60}}"#,
        );
        assert!(matches!(
            EngineConfig::load(inverted.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_bad_json() {
        let file = write_config("{");
        assert!(matches!(EngineConfig::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
