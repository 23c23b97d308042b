use anyhow::{bail, Context, Result};
use migration_monitor_core::PollingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "monitor.toml";

/// Top-level monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_scroll_tolerance")]
    pub scroll_tolerance: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            scroll_tolerance: default_scroll_tolerance(),
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_scroll_tolerance() -> usize {
    2
}

impl MonitorConfig {
    /// Apply command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, server: Option<String>, interval_ms: Option<u64>) {
        if let Some(url) = server {
            self.server.url = url;
        }
        if let Some(ms) = interval_ms {
            self.polling.interval_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.server.url.trim();
        if url.is_empty() {
            bail!("invalid config: server.url is empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("invalid config: server.url must start with http:// or https:// ({url})");
        }
        if self.polling.interval_ms == 0 {
            bail!("invalid config: polling.interval_ms must be greater than 0");
        }
        if self.server.timeout_secs == 0 {
            bail!("invalid config: server.timeout_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig {
            interval: Duration::from_millis(self.polling.interval_ms),
            scroll_tolerance: self.log.scroll_tolerance,
        }
    }
}

/// Get the config directory path (~/.config/migration-monitor/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("migration-monitor"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load config from `explicit`, or from the canonical path when `None`.
///
/// A missing canonical file yields defaults; a missing explicit file is an
/// error.
pub fn load_config(explicit: Option<&Path>) -> Result<MonitorConfig> {
    match explicit {
        Some(path) => load_from(path),
        None => {
            let path = config_path()?;
            if !path.exists() {
                return Ok(MonitorConfig::default());
            }
            load_from(&path)
        }
    }
}

fn load_from(path: &Path) -> Result<MonitorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config: MonitorConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Effective config as TOML, for `migration-monitor config`.
pub fn render_config(config: &MonitorConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config_serializes() {
        let toml_str = render_config(&MonitorConfig::default()).unwrap();
        assert!(toml_str.contains("url = \"http://127.0.0.1:5000\""));
        assert!(toml_str.contains("timeout_secs = 15"));
        assert!(toml_str.contains("interval_ms = 3000"));
        assert!(toml_str.contains("scroll_tolerance = 2"));
    }

    #[test]
    fn test_config_roundtrip() {
        let toml_str = render_config(&MonitorConfig::default()).unwrap();
        let parsed: MonitorConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.url, "http://127.0.0.1:5000");
        assert_eq!(parsed.polling.interval_ms, 3000);
        assert_eq!(parsed.log.scroll_tolerance, 2);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[polling]\ninterval_ms = 500\n");

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.server.url, "http://127.0.0.1:5000");
        assert_eq!(config.server.timeout_secs, 15);
        assert_eq!(config.polling_config().interval, Duration::from_millis(500));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config"));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[server\nurl = 1");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains(&path.display().to_string()));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[server]\nurl = \"http://file:5000\"\n");

        let mut config = load_config(Some(&path)).unwrap();
        config.apply_overrides(Some("https://flag.example".into()), Some(1000));
        assert_eq!(config.server.url, "https://flag.example");
        assert_eq!(config.polling.interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        let mut config = MonitorConfig::default();
        config.polling.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.server.url = "127.0.0.1:5000".into();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.server.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
