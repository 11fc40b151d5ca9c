use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of fetch attempts (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/pour/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PourConfig {
    /// Install prefix; `bin/`, `lib/`, ... live below it. Defaults to `~/.local`.
    #[serde(default)]
    pub prefix: Option<PathBuf>,
    /// Where verified archives are kept when `keep_downloads` is on. Defaults to `~/.cache/pour`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Promote verified downloads to the cache instead of deleting them.
    #[serde(default)]
    pub keep_downloads: bool,
    /// Seconds allowed for the TCP/TLS connect phase.
    pub connect_timeout_secs: u64,
    /// Upper bound for one whole transfer attempt.
    pub fetch_timeout_secs: u64,
    /// Abort an attempt when throughput stays below this many bytes/sec...
    pub low_speed_limit_bytes: u32,
    /// ...for this many seconds.
    pub low_speed_time_secs: u64,
    /// Seconds the smoke test command may run before it is killed.
    pub test_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for PourConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            cache_dir: None,
            keep_downloads: false,
            connect_timeout_secs: 30,
            fetch_timeout_secs: 600,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            test_timeout_secs: 60,
            retry: None,
        }
    }
}

impl PourConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    /// Configured prefix, or `~/.local` (the parent of the XDG data home).
    pub fn resolve_prefix(&self) -> Result<PathBuf> {
        if let Some(p) = &self.prefix {
            return Ok(p.clone());
        }
        default_prefix()
    }

    pub fn resolve_cache_dir(&self) -> Result<PathBuf> {
        if let Some(p) = &self.cache_dir {
            return Ok(p.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("pour")?;
        Ok(xdg_dirs.get_cache_home())
    }
}

fn default_prefix() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::new()?;
    let data_home = xdg_dirs.get_data_home();
    data_home
        .parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("no parent for data home {}", data_home.display()))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pour")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PourConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Same as [`load_or_init`] against an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<PourConfig> {
    if !path.exists() {
        let default_cfg = PourConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: PourConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = PourConfig::default();
        assert!(cfg.prefix.is_none());
        assert!(!cfg.keep_downloads);
        assert_eq!(cfg.connect_timeout_secs, 30);
        assert_eq!(cfg.test_timeout_secs, 60);
        assert_eq!(cfg.retry_policy().max_attempts, 5);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = PourConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PourConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.fetch_timeout_secs, cfg.fetch_timeout_secs);
        assert_eq!(parsed.low_speed_limit_bytes, cfg.low_speed_limit_bytes);
        assert_eq!(parsed.low_speed_time_secs, cfg.low_speed_time_secs);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            prefix = "/opt/pour"
            keep_downloads = true
            connect_timeout_secs = 5
            fetch_timeout_secs = 120
            low_speed_limit_bytes = 10
            low_speed_time_secs = 20
            test_timeout_secs = 3

            [retry]
            max_attempts = 3
            base_delay_secs = 0.5
            max_delay_secs = 15
        "#;
        let cfg: PourConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.resolve_prefix().unwrap(), PathBuf::from("/opt/pour"));
        assert!(cfg.keep_downloads);
        assert_eq!(cfg.test_timeout_secs, 3);
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(15));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let retry = RetryConfig {
            max_attempts: 0,
            base_delay_secs: -1.0,
            max_delay_secs: 1,
        };
        let policy = retry.to_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::ZERO);
    }

    #[test]
    fn load_or_init_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.test_timeout_secs, 60);

        fs::write(&path, "connect_timeout_secs = 1\nfetch_timeout_secs = 2\nlow_speed_limit_bytes = 3\nlow_speed_time_secs = 4\ntest_timeout_secs = 5\n").unwrap();
        let cfg = load_or_init_at(&path).unwrap();
        assert_eq!(cfg.connect_timeout_secs, 1);
        assert_eq!(cfg.test_timeout_secs, 5);
    }
}
