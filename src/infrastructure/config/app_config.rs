//! Loader configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::domain::entities::{DisplayOptions, ImageSize};
use crate::infrastructure::image::disk_cache::{DEFAULT_MAX_CACHE_SIZE, default_cache_dir};
use crate::infrastructure::image::memory_cache::DEFAULT_CACHE_SIZE;

pub(crate) const APP_NAME: &str = "pixload";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "linuxmobile";

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

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
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

/// Settings read from `config.toml`, overridable from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Concurrent tasks in the general pool.
    #[serde(default = "default_general_pool_size")]
    pub general_pool_size: usize,

    /// Connect timeout for remote sources, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub http_connect_timeout_secs: u64,

    /// Read timeout for remote sources, in seconds.
    #[serde(default = "default_read_timeout")]
    pub http_read_timeout_secs: u64,

    /// Decoded images kept in memory.
    #[serde(default = "default_memory_cache_size")]
    pub memory_cache_size: usize,

    /// Keep at most one decoded size per id in memory.
    #[serde(default)]
    pub deny_multiple_sizes_in_memory: bool,

    /// Directory of the disc cache.
    #[serde(default = "default_cache_dir")]
    pub disc_cache_dir: PathBuf,

    /// Disc cache budget in bytes.
    #[serde(default = "default_disc_cache_size")]
    pub disc_cache_size: u64,

    /// Decode width used when a target declares no size.
    #[serde(default = "default_max_width")]
    pub max_image_width: u32,

    /// Decode height used when a target declares no size.
    #[serde(default = "default_max_height")]
    pub max_image_height: u32,

    /// Base delay between out-of-memory decode retries, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub decode_retry_backoff_ms: u64,

    /// Allocation budget for a single decode, in bytes.
    #[serde(default)]
    pub decode_memory_limit: Option<u64>,

    /// Options used when a request supplies none.
    #[serde(default)]
    pub default_display_options: DisplayOptions,
}

const fn default_general_pool_size() -> usize {
    3
}

const fn default_connect_timeout() -> u64 {
    5
}

const fn default_read_timeout() -> u64 {
    20
}

const fn default_memory_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

const fn default_disc_cache_size() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

const fn default_max_width() -> u32 {
    800
}

const fn default_max_height() -> u32 {
    600
}

const fn default_backoff_ms() -> u64 {
    1000
}

impl LoaderSettings {
    /// Merges CLI arguments into the settings.
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
        if let Some(pool_size) = args.pool_size {
            self.general_pool_size = pool_size;
        }
        if let Some(size) = args.size {
            self.max_image_width = size.width;
            self.max_image_height = size.height;
        }
        if let Some(policy) = args.policy {
            self.default_display_options.decoding_policy = policy;
        }
        if args.no_disc_cache {
            self.default_display_options.cache_on_disc = false;
        }
    }

    /// Fallback decode size.
    #[must_use]
    pub const fn max_image_size(&self) -> ImageSize {
        ImageSize::new(self.max_image_width, self.max_image_height)
    }

    /// Connect timeout for remote sources.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }

    /// Read timeout for remote sources.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.http_read_timeout_secs)
    }

    /// Base delay between decode retries.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.decode_retry_backoff_ms)
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("pixload.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            general_pool_size: default_general_pool_size(),
            http_connect_timeout_secs: default_connect_timeout(),
            http_read_timeout_secs: default_read_timeout(),
            memory_cache_size: default_memory_cache_size(),
            deny_multiple_sizes_in_memory: false,
            disc_cache_dir: default_cache_dir(),
            disc_cache_size: default_disc_cache_size(),
            max_image_width: default_max_width(),
            max_image_height: default_max_height(),
            decode_retry_backoff_ms: default_backoff_ms(),
            decode_memory_limit: None,
            default_display_options: DisplayOptions::default(),
        }
    }
}
