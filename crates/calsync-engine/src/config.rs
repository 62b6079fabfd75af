//! Engine configuration.
//!
//! [`EngineConfig`] is what the engine runs with. [`EngineSettings`] is its
//! file form: every field optional, durations in milliseconds.
//!
//! ```toml
//! grace_delay_ms = 10000
//! max_conflict_retries = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Configuration for the calendar engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a deferred write stays cancellable.
    pub grace_delay: Duration,
    /// How long desktop error notifications stay visible.
    pub error_display_delay: Duration,
    /// Retries allowed after a write is rejected with a stale version tag.
    pub max_conflict_retries: u32,
    /// How long recurring masters stay in the master cache.
    pub master_cache_ttl: Duration,
    /// Number of settled grace tasks remembered for late cancels.
    pub settled_task_memory: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineSettings::default().into_config()
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the grace delay.
    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    /// Sets how long error notifications stay visible.
    pub fn with_error_display_delay(mut self, delay: Duration) -> Self {
        self.error_display_delay = delay;
        self
    }

    /// Sets the number of attempts for conflicted writes.
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Sets the master cache TTL.
    pub fn with_master_cache_ttl(mut self, ttl: Duration) -> Self {
        self.master_cache_ttl = ttl;
        self
    }

    /// Sets how many settled grace tasks are remembered.
    pub fn with_settled_task_memory(mut self, size: usize) -> Self {
        self.settled_task_memory = size;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_conflict_retries == 0 {
            return Err(EngineError::config(
                "max_conflict_retries must be at least 1",
            ));
        }
        if self.settled_task_memory == 0 {
            return Err(EngineError::config(
                "settled_task_memory must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parses and validates a TOML configuration.
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let settings: EngineSettings = toml::from_str(content)
            .map_err(|e| EngineError::config(format!("failed to parse config: {}", e)))?;
        let config = settings.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML configuration file.
    pub fn load_from(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// File representation of [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub grace_delay_ms: u64,
    pub error_display_delay_ms: u64,
    pub max_conflict_retries: u32,
    pub master_cache_ttl_ms: u64,
    pub settled_task_memory: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grace_delay_ms: 10_000,
            error_display_delay_ms: 3_000,
            max_conflict_retries: 3,
            master_cache_ttl_ms: 300_000, // 5 minutes
            settled_task_memory: 1024,
        }
    }
}

impl EngineSettings {
    pub fn into_config(self) -> EngineConfig {
        EngineConfig {
            grace_delay: Duration::from_millis(self.grace_delay_ms),
            error_display_delay: Duration::from_millis(self.error_display_delay_ms),
            max_conflict_retries: self.max_conflict_retries,
            master_cache_ttl: Duration::from_millis(self.master_cache_ttl_ms),
            settled_task_memory: self.settled_task_memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_settings() {
        insta::assert_json_snapshot!(EngineSettings::default(), @r#"
        {
          "grace_delay_ms": 10000,
          "error_display_delay_ms": 3000,
          "max_conflict_retries": 3,
          "master_cache_ttl_ms": 300000,
          "settled_task_memory": 1024
        }
        "#);
    }

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.grace_delay, Duration::from_secs(10));
        assert_eq!(config.max_conflict_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods() {
        let config = EngineConfig::new()
            .with_grace_delay(Duration::from_secs(5))
            .with_error_display_delay(Duration::from_secs(1))
            .with_max_conflict_retries(1)
            .with_master_cache_ttl(Duration::from_secs(60))
            .with_settled_task_memory(8);

        assert_eq!(config.grace_delay, Duration::from_secs(5));
        assert_eq!(config.error_display_delay, Duration::from_secs(1));
        assert_eq!(config.max_conflict_retries, 1);
        assert_eq!(config.master_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.settled_task_memory, 8);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("grace_delay_ms = 2500\n").unwrap();
        assert_eq!(config.grace_delay, Duration::from_millis(2500));
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn zero_retries_rejected() {
        let err = EngineConfig::from_toml_str("max_conflict_retries = 0\n").unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
        assert!(err.to_string().contains("max_conflict_retries"));
    }

    #[test]
    fn invalid_toml_rejected() {
        let err = EngineConfig::from_toml_str("grace_delay_ms = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "grace_delay_ms = 100").unwrap();
        writeln!(file, "settled_task_memory = 4").unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.grace_delay, Duration::from_millis(100));
        assert_eq!(config.settled_task_memory, 4);
    }

    #[test]
    fn load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load_from(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
