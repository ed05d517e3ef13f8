use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::container::DEFAULT_RECENT_CAPACITY;
use crate::error::ConfigError;
use crate::live::{Backoff, LiveConfig};
use crate::stream::StreamSettings;
use crate::viewport::ViewportSettings;

/// Buffer size for event channels feeding the main loop
pub const DEFAULT_CHANNEL_BUFFER: usize = 1000;

pub const APP_NAME: &str = "tideline";

/// Configuration for tide
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base url of the history service; the live channel uses the same host
    pub server: String,
    /// Capacity of the recent-activity panel
    pub recent_capacity: usize,
    pub heartbeat_secs: u64,
    pub reconnect_min_ms: u64,
    pub reconnect_max_ms: u64,
    pub request_timeout_secs: u64,
    /// Rows from either end of the scrollback at which paging starts
    pub edge_margin: usize,
    /// Rows from the newest line that still count as following
    pub pin_tolerance: usize,
    pub row_height: u32,
    pub theme: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "http://localhost:8080".to_string(),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            heartbeat_secs: 10,
            reconnect_min_ms: 500,
            reconnect_max_ms: 30_000,
            request_timeout_secs: 10,
            edge_margin: 5,
            pin_tolerance: 1,
            row_height: 1,
            theme: "default".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location if one exists, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<config dir>/tideline/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
    }

    /// Where the log file goes when none is configured.
    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_NAME)
                .join("tide.log")
        })
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup("TIDE_SERVER") {
            self.server = server;
        }
        if let Some(capacity) = lookup("TIDE_RECENT_CAPACITY").and_then(|s| s.parse().ok()) {
            self.recent_capacity = capacity;
        }
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            recent_capacity: self.recent_capacity,
            viewport: ViewportSettings {
                row_height: self.row_height,
                edge_margin: self.edge_margin,
                pin_tolerance: self.pin_tolerance,
                ..ViewportSettings::default()
            },
        }
    }

    pub fn live_config(&self, source_id: &str) -> LiveConfig {
        LiveConfig {
            heartbeat: Duration::from_secs(self.heartbeat_secs.max(1)),
            backoff: Backoff {
                min: Duration::from_millis(self.reconnect_min_ms),
                max: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_min_ms)),
            },
            ..LiveConfig::new(&self.server, source_id)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.recent_capacity, 100);
        assert_eq!(config.heartbeat_secs, 10);
        assert_eq!(config.live_config("billing").url, "ws://localhost:8080/ws/billing");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = \"https://logs.example.com\"\nrecent_capacity = 50").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server, "https://logs.example.com");
        assert_eq!(config.recent_capacity, 50);
        assert_eq!(config.edge_margin, 5);
        assert_eq!(config.stream_settings().recent_capacity, 50);
    }

    #[test]
    fn test_bad_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "recent_capacity = \"lots\"").unwrap();
        match Config::from_file(file.path()) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "TIDE_SERVER" => Some("http://10.1.1.1:9000".to_string()),
            "TIDE_RECENT_CAPACITY" => Some("not a number".to_string()),
            _ => None,
        });
        assert_eq!(config.server, "http://10.1.1.1:9000");
        assert_eq!(config.recent_capacity, 100);
    }
}
