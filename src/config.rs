//! Settings file for the logdeck CLI.
//!
//! Every key is optional; missing keys take their defaults. Command-line flags
//! are applied on top by `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use logdeck_logs::{DEFAULT_MAX_LOGS, StoreConfig};
use logdeck_types::{LogFilter, LogLevel};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub max_logs: usize,
    pub auto_scroll: bool,
    pub levels: Vec<LogLevel>,
    pub use_regex: bool,
    pub search_fields: bool,
    /// Directory holding session `*.log` files
    pub session_dir: Option<PathBuf>,
    pub reconnect_delay_ms: u64,
    pub follow_poll_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            auto_scroll: true,
            levels: LogLevel::ALL.to_vec(),
            use_regex: false,
            search_fields: true,
            session_dir: None,
            reconnect_delay_ms: 1000,
            follow_poll_ms: 200,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location if it exists.
    ///
    /// An explicitly given path must exist; the default one may not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings = Self::from_toml_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_logs: self.max_logs,
            auto_scroll: self.auto_scroll,
            filter: LogFilter {
                levels: self.levels.iter().copied().collect(),
                use_regex: self.use_regex,
                search_fields: self.search_fields,
                ..LogFilter::default()
            },
        }
    }

    /// Configured session directory, else `<data dir>/logdeck/logs`
    pub fn session_dir(&self) -> PathBuf {
        self.session_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("logdeck")
                .join("logs")
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn follow_poll(&self) -> Duration {
        Duration::from_millis(self.follow_poll_ms.max(1))
    }
}

/// `<config dir>/logdeck/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("logdeck").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file() {
        let settings = Settings::from_toml_str(
            r#"
            max_logs = 250
            levels = ["warn", "ERROR"]
            session_dir = "/var/log/app"
            "#,
        )
        .unwrap();

        assert_eq!(settings.max_logs, 250);
        assert_eq!(settings.levels, vec![LogLevel::Warn, LogLevel::Error]);
        assert_eq!(settings.session_dir(), PathBuf::from("/var/log/app"));
        assert!(settings.auto_scroll);
        assert_eq!(settings.follow_poll(), Duration::from_millis(200));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Settings::from_toml_str("max_log = 10").is_err());
    }

    #[test]
    fn test_store_config() {
        let settings = Settings {
            levels: vec![LogLevel::Error],
            use_regex: true,
            search_fields: false,
            ..Settings::default()
        };
        let config = settings.store_config();

        assert_eq!(config.max_logs, DEFAULT_MAX_LOGS);
        assert_eq!(config.filter.levels.len(), 1);
        assert!(config.filter.use_regex);
        assert!(!config.filter.search_fields);
        assert!(config.filter.search.is_empty());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logdeck.toml");
        std::fs::write(&path, "auto_scroll = false\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert!(!settings.auto_scroll);

        assert!(Settings::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
