use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Shortest progress interval accepted; anything lower is clamped up.
pub const MIN_PROGRESS_INTERVAL_MS: u64 = 16;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per connection (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Engine configuration loaded from `~/.config/segdl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of tasks in RUNNING at once.
    pub max_running_tasks: usize,
    /// Upper bound on chunks (and worker connections) per task.
    pub threads_per_task: usize,
    /// Smallest chunk worth its own connection.
    pub min_chunk_bytes: u64,
    /// Size of each pipeline segment buffer.
    pub buffer_bytes: usize,
    /// Minimum spacing between progress reports for one task.
    pub progress_interval_ms: u64,
    /// Minimum spacing between chunk checkpoints for one task.
    pub checkpoint_interval_ms: u64,
    /// How long a worker waits for a free segment before re-checking its stop token.
    pub acquire_timeout_ms: u64,
    /// Optional global bandwidth cap in bytes per second (None = no cap).
    #[serde(default)]
    pub max_bytes_per_sec: Option<u64>,
    /// When false, downloads refuse to start on metered networks.
    pub allow_metered: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Default destination directory for the CLI (None = current directory).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_running_tasks: 4,
            threads_per_task: 4,
            min_chunk_bytes: 256 * 1024,
            buffer_bytes: 64 * 1024,
            progress_interval_ms: 333,
            checkpoint_interval_ms: 1000,
            acquire_timeout_ms: 1000,
            max_bytes_per_sec: None,
            allow_metered: true,
            retry: None,
            download_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(|r| RetryPolicy {
                max_attempts: r.max_attempts.max(1),
                base_delay: Duration::from_secs_f64(r.base_delay_secs.max(0.0)),
                max_delay: Duration::from_secs(r.max_delay_secs),
            })
            .unwrap_or_default()
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(MIN_PROGRESS_INTERVAL_MS))
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms.max(1))
    }
}

/// Settings the engine can change while tasks run.
#[derive(Debug)]
pub struct RuntimeSettings {
    progress_interval_ms: AtomicU64,
    allow_metered: AtomicBool,
}

impl RuntimeSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            progress_interval_ms: AtomicU64::new(cfg.progress_interval().as_millis() as u64),
            allow_metered: AtomicBool::new(cfg.allow_metered),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.load(Ordering::Relaxed))
    }

    /// Values below [`MIN_PROGRESS_INTERVAL_MS`] are clamped up.
    pub fn set_progress_interval(&self, interval: Duration) {
        let ms = (interval.as_millis() as u64).max(MIN_PROGRESS_INTERVAL_MS);
        self.progress_interval_ms.store(ms, Ordering::Relaxed);
    }

    pub fn allow_metered(&self) -> bool {
        self.allow_metered.load(Ordering::Relaxed)
    }

    pub fn set_allow_metered(&self, allow: bool) {
        self.allow_metered.store(allow, Ordering::Relaxed);
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("segdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: EngineConfig = toml::from_str(&data)?;
    Ok(cfg)
}
