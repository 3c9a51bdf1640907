//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::infrastructure::image::disk_store::{DEFAULT_MAX_ENTRIES, DEFAULT_MAX_STORE_SIZE};
use crate::infrastructure::image::http_fetcher::DEFAULT_TIMEOUT;
use crate::infrastructure::image::worker_pool::DEFAULT_MAX_CONCURRENT;

pub(crate) const APP_NAME: &str = "imgcache";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "imgcache";

const DEFAULT_SUBDIR: &str = "images";
const DEFAULT_MEMORY_CLASS_MB: usize = 64;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Image cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Image cache settings, read once when the cache is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory under `base_dir` holding the persistent tier.
    /// `None` keeps the cache memory-only.
    pub subdir: Option<String>,

    /// Root for `subdir`; the platform cache directory when unset.
    pub base_dir: Option<PathBuf>,

    /// Skip the persistent tier even when `subdir` is set.
    pub memory_only: bool,

    /// Byte budget of the persistent tier.
    pub max_disk_bytes: u64,

    /// Entry budget of the persistent tier.
    pub max_disk_entries: usize,

    /// Process memory class in MiB; the memory tier gets an eighth of it.
    pub memory_class_mb: usize,

    /// Fetches allowed to run at once.
    pub max_concurrent_fetches: usize,

    /// Network timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            subdir: Some(DEFAULT_SUBDIR.to_string()),
            base_dir: None,
            memory_only: false,
            max_disk_bytes: DEFAULT_MAX_STORE_SIZE,
            max_disk_entries: DEFAULT_MAX_ENTRIES,
            memory_class_mb: DEFAULT_MEMORY_CLASS_MB,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Returns the persistent tier directory, or `None` for a memory-only
    /// cache.
    #[must_use]
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if self.memory_only {
            return None;
        }
        let subdir = self.subdir.as_deref()?;
        let base = self.base_dir.clone().or_else(Self::default_base_dir)?;
        Some(base.join(subdir))
    }

    /// Returns the platform cache directory.
    #[must_use]
    pub fn default_base_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().to_path_buf())
    }

    /// Returns the network timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.base_dir = Some(cache_dir.clone());
        }
        if args.memory_only {
            self.cache.memory_only = true;
        }
        if let Some(max_concurrent) = args.max_concurrent {
            self.cache.max_concurrent_fetches = max_concurrent;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("imgcache.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
