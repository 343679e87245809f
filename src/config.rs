//! Configuration: app directory and `imgwarm.json` settings.
//!
//! Directory priority: CLI `--config-dir` → `IMGWARM_CONFIG_DIR` → platform
//! config dir. Settings and the default log file both live there.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::scheduler::{DEFAULT_FALLBACK_DELAY_MS, SchedulingMode, select_scheduler};
use crate::core::{ImageFetcher, LOOKAHEAD, LoadMode, PreloadCache, TaskPool, Workers};

/// Settings file name inside the app directory
pub const CONFIG_FILE: &str = "imgwarm.json";
/// Default log file name inside the app directory
pub const LOG_FILE: &str = "imgwarm.log";

const ENV_CONFIG_DIR: &str = "IMGWARM_CONFIG_DIR";

/// Resolve the app directory.
///
/// Platform default:
/// - Linux: ~/.config/imgwarm
/// - macOS: ~/Library/Application Support/imgwarm
/// - Windows: %APPDATA%\imgwarm
pub fn app_dir(cli_dir: Option<PathBuf>) -> PathBuf {
    cli_dir
        .or_else(|| std::env::var_os(ENV_CONFIG_DIR).map(PathBuf::from))
        .or_else(|| dirs_next::config_dir().map(|dir| dir.join("imgwarm")))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create app directory: {}", dir.display()))
}

/// Preload settings (`imgwarm.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Worker threads (0 = auto, 75% of cores)
    pub workers: usize,
    pub scheduling: SchedulingMode,
    /// Delay used when no idle lane is available
    pub fallback_delay_ms: u64,
    /// Look-ahead window width for upcoming prefetch
    pub lookahead: usize,
    pub load_mode: LoadMode,
    /// Base directory for relative keys
    pub base_dir: Option<PathBuf>,
    /// Images warmed once at startup
    pub critical: Vec<String>,
    /// Give prefetch its own lane behind regular fetches
    pub idle_lane: bool,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            scheduling: SchedulingMode::Auto,
            fallback_delay_ms: DEFAULT_FALLBACK_DELAY_MS,
            lookahead: LOOKAHEAD,
            load_mode: LoadMode::Probe,
            base_dir: None,
            critical: Vec::new(),
            idle_lane: true,
        }
    }
}

impl PreloadConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Load `imgwarm.json` from the config dir; defaults if missing or broken.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                info!("Loaded config: {}", path.display());
                config
            }
            Err(e) => {
                warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Effective worker count
    pub fn worker_threads(&self) -> usize {
        if self.workers > 0 { self.workers } else { Workers::default_threads() }
    }

    /// Wire workers, scheduler and fetcher into a cache.
    pub fn build_cache(&self) -> PreloadCache {
        let pool: Arc<dyn TaskPool> =
            Arc::new(Workers::with_idle_lane(self.worker_threads(), self.idle_lane));
        let scheduler = select_scheduler(self.scheduling, Arc::clone(&pool), self.fallback_delay_ms);
        let fetcher = Arc::new(ImageFetcher::new(self.base_dir.clone(), self.load_mode));

        PreloadCache::new(fetcher, pool, scheduler).with_lookahead(self.lookahead)
    }
}
