//! Configuration for circus-progression

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("circus-progression")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Database file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,

    /// Suggestion thresholds and cache lifetime
    #[serde(default)]
    pub suggestions: SuggestionSettings,
}

/// Thresholds, limits and TTL used by the suggestion aggregator and cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionSettings {
    /// Minimum readiness score for an individual suggestion
    #[serde(default = "default_individual_threshold")]
    pub individual_threshold: u8,

    #[serde(default = "default_limit")]
    pub individual_limit: usize,

    /// Score at which a group member counts as ready for a figure
    #[serde(default = "default_ready_threshold")]
    pub ready_threshold: u8,

    /// Minimum share of ready members for a group suggestion
    #[serde(default = "default_group_threshold")]
    pub group_threshold: u8,

    #[serde(default = "default_limit")]
    pub group_limit: usize,

    #[serde(default = "default_individual_threshold")]
    pub refresh_individual_threshold: u8,

    #[serde(default = "default_refresh_limit")]
    pub refresh_individual_limit: usize,

    #[serde(default = "default_group_threshold")]
    pub refresh_group_threshold: u8,

    #[serde(default = "default_refresh_limit")]
    pub refresh_group_limit: usize,

    /// Lifetime of refreshed cache rows
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
}

fn default_database_file() -> String {
    "progression.db".to_string()
}

fn default_pool_size() -> u32 {
    8
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u32 {
    5000
}

fn default_individual_threshold() -> u8 {
    60
}

fn default_ready_threshold() -> u8 {
    80
}

fn default_group_threshold() -> u8 {
    50
}

fn default_limit() -> usize {
    5
}

fn default_refresh_limit() -> usize {
    10
}

fn default_cache_ttl_hours() -> i64 {
    24
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            individual_threshold: default_individual_threshold(),
            individual_limit: default_limit(),
            ready_threshold: default_ready_threshold(),
            group_threshold: default_group_threshold(),
            group_limit: default_limit(),
            refresh_individual_threshold: default_individual_threshold(),
            refresh_individual_limit: default_refresh_limit(),
            refresh_group_threshold: default_group_threshold(),
            refresh_group_limit: default_refresh_limit(),
            cache_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
            busy_timeout_ms: default_busy_timeout(),
            suggestions: SuggestionSettings::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get database file path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SuggestionSettings::default();
        assert_eq!(settings.individual_threshold, 60);
        assert_eq!(settings.individual_limit, 5);
        assert_eq!(settings.ready_threshold, 80);
        assert_eq!(settings.group_threshold, 50);
        assert_eq!(settings.refresh_individual_limit, 10);
        assert_eq!(settings.cache_ttl_hours, 24);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            database_file = "school.db"

            [suggestions]
            group_threshold = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.database_file, "school.db");
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.suggestions.group_threshold, 60);
        assert_eq!(config.suggestions.individual_threshold, 60);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.storage_dir = dir.path().to_path_buf();
        config.suggestions.individual_limit = 3;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.suggestions, config.suggestions);
        assert_eq!(loaded.database_path(), dir.path().join("progression.db"));
    }
}
