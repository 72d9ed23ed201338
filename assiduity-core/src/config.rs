//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/assiduity/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/assiduity/` (~/.config/assiduity/)
//! - Data: `$XDG_DATA_HOME/assiduity/` (~/.local/share/assiduity/)
//! - State/Logs: `$XDG_STATE_HOME/assiduity/` (~/.local/state/assiduity/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Statistics dashboard configuration
    #[serde(default)]
    pub stats: StatsConfig,

    /// Database location override
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limits and thresholds used by the aggregation engine
#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    /// Number of entries kept in the top performers list
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,

    /// Number of entries kept in the at-risk list
    #[serde(default = "default_at_risk_limit")]
    pub at_risk_limit: usize,

    /// Members strictly below this rate (and above zero) are at risk
    #[serde(default = "default_at_risk_threshold")]
    pub at_risk_threshold: f64,

    /// Number of most recent events in the attendance trend
    #[serde(default = "default_trend_events")]
    pub trend_events: usize,

    /// Maximum characters of a member display name
    #[serde(default = "default_name_width")]
    pub name_width: usize,

    /// Maximum characters of a group name in the comparison view
    #[serde(default = "default_group_name_width")]
    pub group_name_width: usize,

    /// Maximum characters of an event label in the trend view
    #[serde(default = "default_event_label_width")]
    pub event_label_width: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            top_limit: default_top_limit(),
            at_risk_limit: default_at_risk_limit(),
            at_risk_threshold: default_at_risk_threshold(),
            trend_events: default_trend_events(),
            name_width: default_name_width(),
            group_name_width: default_group_name_width(),
            event_label_width: default_event_label_width(),
        }
    }
}

impl StatsConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.top_limit == 0 {
            return Err(Error::Config(
                "stats.top_limit must be at least 1".to_string(),
            ));
        }
        if self.at_risk_limit == 0 {
            return Err(Error::Config(
                "stats.at_risk_limit must be at least 1".to_string(),
            ));
        }
        if self.trend_events == 0 {
            return Err(Error::Config(
                "stats.trend_events must be at least 1".to_string(),
            ));
        }
        if !(self.at_risk_threshold > 0.0 && self.at_risk_threshold <= 100.0) {
            return Err(Error::Config(
                "stats.at_risk_threshold must be in (0, 100]".to_string(),
            ));
        }
        if self.name_width == 0 || self.group_name_width == 0 || self.event_label_width == 0 {
            return Err(Error::Config(
                "stats label widths must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_top_limit() -> usize {
    10
}

fn default_at_risk_limit() -> usize {
    15
}

fn default_at_risk_threshold() -> f64 {
    70.0
}

fn default_trend_events() -> usize {
    10
}

fn default_name_width() -> usize {
    25
}

fn default_group_name_width() -> usize {
    20
}

fn default_event_label_width() -> usize {
    15
}

/// Database configuration
#[derive(Debug, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Override path for the SQLite database
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.stats.validate()?;
        Ok(config)
    }

    /// Database path honoring the `[database] path` override
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/assiduity/config.toml` (~/.config/assiduity/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("assiduity").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/assiduity/` (~/.local/share/assiduity/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("assiduity")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/assiduity/` (~/.local/state/assiduity/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("assiduity")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/assiduity/assiduity.db` (~/.local/share/assiduity/assiduity.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("assiduity.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stats.top_limit, 10);
        assert_eq!(config.stats.at_risk_limit, 15);
        assert_eq!(config.stats.at_risk_threshold, 70.0);
        assert_eq!(config.stats.trend_events, 10);
        assert_eq!(config.stats.name_width, 25);
        assert!(config.database.path.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[stats]
top_limit = 5
at_risk_threshold = 60.0

[database]
path = "/tmp/assiduity-test.db"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.stats.top_limit, 5);
        assert_eq!(config.stats.at_risk_limit, 15);
        assert_eq!(config.stats.at_risk_threshold, 60.0);
        assert_eq!(
            config.resolved_database_path(),
            PathBuf::from("/tmp/assiduity-test.db")
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_stats_config_validation() {
        assert!(StatsConfig::default().validate().is_ok());

        let config = StatsConfig {
            top_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StatsConfig {
            at_risk_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StatsConfig {
            at_risk_threshold: 120.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_rejects_invalid_stats() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[stats]\ntrend_events = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
