use crate::feeds::twitter::DEFAULT_API_BASE;
use crate::refresh::RefreshPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const BEARER_TOKEN_VAR: &str = "TWITTER_BEARER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Handle whose mentions are tracked, without the "@".
    pub target_handle: String,
    /// Snapshots younger than this are served straight from memory.
    pub cache_ttl_secs: u64,
    pub full_refresh_interval_secs: u64,
    /// Scheduler tick period.
    pub incremental_check_interval_secs: u64,
    pub page_delay_ms: u64,
    pub refresh_timeout_secs: u64,
    pub max_mentions: usize,
    pub snapshot_path: Option<PathBuf>,
    pub api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_handle: "openservai".to_string(),
            cache_ttl_secs: 5 * 60,
            full_refresh_interval_secs: 24 * 60 * 60,
            incremental_check_interval_secs: 10 * 60,
            page_delay_ms: 1000,
            refresh_timeout_secs: 10 * 60,
            max_mentions: 50_000,
            snapshot_path: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.target_handle = config.target_handle.trim().trim_start_matches('@').to_string();
        if config.target_handle.is_empty() {
            anyhow::bail!("target_handle must not be empty");
        }
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mentionboard").join("config.toml"))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mentionboard")
                .join("snapshot.json")
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn full_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.full_refresh_interval_secs)
    }

    pub fn incremental_check_interval(&self) -> Duration {
        // a zero period would panic in tokio::time::interval
        Duration::from_secs(self.incremental_check_interval_secs.max(1))
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            cache_ttl: self.cache_ttl(),
            full_refresh_interval: self.full_refresh_interval(),
            fetch_timeout: Duration::from_secs(self.refresh_timeout_secs),
            max_mentions: self.max_mentions.max(1),
        }
    }

    pub fn bearer_token() -> Result<String> {
        std::env::var(BEARER_TOKEN_VAR)
            .with_context(|| format!("missing {} environment variable", BEARER_TOKEN_VAR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.target_handle, "openservai");
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_toml(
            r#"
            target_handle = "@SomeBrand"
            cache_ttl_secs = 60
            full_refresh_interval_secs = 7200
            incremental_check_interval_secs = 0
            max_mentions = 10
            snapshot_path = "/tmp/board.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.target_handle, "SomeBrand");
        assert_eq!(config.incremental_check_interval(), Duration::from_secs(1));
        let policy = config.refresh_policy();
        assert_eq!(policy.cache_ttl, Duration::from_secs(60));
        assert_eq!(policy.full_refresh_interval, Duration::from_secs(7200));
        assert_eq!(policy.max_mentions, 10);
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/board.json"));
    }

    #[test]
    fn test_blank_handle_rejected() {
        assert!(Config::from_toml(r#"target_handle = " @ ""#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config.page_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "target_handle = \"acme\"\npage_delay_ms = 250\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();

        assert_eq!(config.target_handle, "acme");
        assert_eq!(config.page_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "cache_ttl_secs = \"soon\"").unwrap();

        assert!(Config::load(Some(path.as_path())).is_err());
    }
}
