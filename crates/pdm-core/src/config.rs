use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk or stream (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds; attempt n waits base * 2^(n-1).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

/// Per-request socket timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// HEAD / SIZE probe, whole request.
    pub probe_secs: u64,
    /// Chunk and HTTP stream: abort after this long without progress.
    pub chunk_secs: u64,
    /// FTP control connection setup for transfers.
    pub ftp_connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe_secs: 30,
            chunk_secs: 60,
            ftp_connect_secs: 60,
        }
    }
}

/// Global configuration loaded from `~/.config/pdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdmConfig {
    /// Directory that holds one subdirectory per project.
    pub projects_root: PathBuf,
    /// Parallel chunk hint used when a caller does not pass one.
    pub default_concurrency: usize,
    /// Smallest chunk the scheduler will emit.
    pub min_chunk_bytes: u64,
    /// Read size for single-stream transfers.
    pub stream_buffer_bytes: usize,
    /// Minimum interval between speed/ETA samples.
    pub progress_interval_ms: u64,
    /// Parallel supervisor tick (file-size polling and completion checks).
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for PdmConfig {
    fn default() -> Self {
        Self {
            projects_root: PathBuf::from("./projects"),
            default_concurrency: 8,
            min_chunk_bytes: 1024 * 1024,
            stream_buffer_bytes: 8 * 1024,
            progress_interval_ms: 1000,
            poll_interval_ms: 500,
            timeouts: TimeoutConfig::default(),
            retry: None,
        }
    }
}

impl PdmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_default()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.probe_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.chunk_secs)
    }

    pub fn ftp_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.ftp_connect_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg: PdmConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = PdmConfig::default();
        assert_eq!(cfg.default_concurrency, 8);
        assert_eq!(cfg.min_chunk_bytes, 1024 * 1024);
        assert_eq!(cfg.stream_buffer_bytes, 8192);
        assert_eq!(cfg.probe_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.chunk_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.retry_policy().max_attempts, 3);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = PdmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.projects_root, cfg.projects_root);
        assert_eq!(parsed.default_concurrency, cfg.default_concurrency);
        assert_eq!(parsed.poll_interval_ms, cfg.poll_interval_ms);
        assert_eq!(parsed.timeouts.ftp_connect_secs, 60);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            projects_root = "/srv/projects"
            default_concurrency = 4
            min_chunk_bytes = 65536
            stream_buffer_bytes = 16384
            progress_interval_ms = 250
            poll_interval_ms = 100

            [retry]
            max_attempts = 5
            base_delay_secs = 0.25
            max_delay_secs = 10
        "#;
        let cfg: PdmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.projects_root, PathBuf::from("/srv/projects"));
        assert_eq!(cfg.default_concurrency, 4);
        assert_eq!(cfg.timeouts.probe_secs, 30);
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn poll_interval_has_floor() {
        let mut cfg = PdmConfig::default();
        cfg.poll_interval_ms = 0;
        assert_eq!(cfg.poll_interval(), Duration::from_millis(10));
    }
}
