use std::time::Duration;

use schoolhub_auth::AccessConfig;
use schoolhub_cache::{CacheOptions, DEFAULT_COMPACTION_INTERVAL, DEFAULT_TOMBSTONE_RATIO};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Access control configuration
    #[serde(default)]
    pub auth: AccessConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Cache validations
        let ratio = self.cache.tombstone_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err("cache.tombstone_ratio must be in (0, 1]".into());
        }
        if self.cache.compaction_interval.is_zero() {
            return Err("cache.compaction_interval must be > 0".into());
        }
        // Auth validation
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Entity cache tuning, shared by every manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Deleted/total ratio at which a delete wakes the compactor.
    pub tombstone_ratio: f64,
    /// Period of the timer-driven compaction pass.
    #[serde(with = "humantime_serde")]
    pub compaction_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tombstone_ratio: DEFAULT_TOMBSTONE_RATIO,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
        }
    }
}

impl CacheConfig {
    pub fn options(&self) -> CacheOptions {
        CacheOptions {
            tombstone_ratio: self.tombstone_ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store; nothing survives a restart.
    #[default]
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "schoolhub.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SCHOOLHUB__AUTH__TOKEN_TTL=12h
        builder = builder.add_source(
            Environment::with_prefix("SCHOOLHUB")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cache.compaction_interval, Duration::from_secs(300));
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_bad_ratio_rejected() {
        let mut cfg = AppConfig::default();
        cfg.cache.tombstone_ratio = 0.0;
        assert!(cfg.validate().unwrap_err().contains("tombstone_ratio"));
        cfg.cache.tombstone_ratio = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_level_rejected() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn test_default_renders_as_toml() {
        let rendered = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(rendered.contains("[cache]"));
        assert!(rendered.contains("compaction_interval = \"5m\""));
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.auth.min_password_length, 6);
    }
}
