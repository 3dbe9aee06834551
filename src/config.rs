//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::retrieval::{HttpConfig, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local archive configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Gaps up to this many microseconds count as covered
    #[serde(default)]
    pub merge_tolerance_us: i64,

    /// Drop index entries whose files are gone before retrieving
    #[serde(default = "default_true")]
    pub verify_files: bool,
}

fn rover_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("rover"))
        .unwrap_or_else(|| PathBuf::from("./rover_data"))
}

fn default_data_dir() -> String {
    rover_data_root().join("mseed").to_string_lossy().to_string()
}

fn default_index_path() -> String {
    rover_data_root().join("index.sqlite").to_string_lossy().to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_path: default_index_path(),
            merge_tolerance_us: 0,
            verify_files: true,
        }
    }
}

/// Remote retrieval configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_data_url")]
    pub data_url: String,

    #[serde(default = "default_availability_url")]
    pub availability_url: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Mark the whole requested interval covered after a short read
    #[serde(default = "default_true")]
    pub cover_remote_gaps: bool,
}

fn default_data_url() -> String {
    "https://service.iris.edu/fdsnws/dataselect/1/query".to_string()
}

fn default_availability_url() -> Option<String> {
    Some("https://service.iris.edu/fdsnws/availability/1/query".to_string())
}

fn default_timeout() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_workers() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            availability_url: default_availability_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            workers: default_workers(),
            cover_remote_gaps: true,
        }
    }
}

impl RetrievalConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.backoff_multiplier,
        )
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            data_url: self.data_url.clone(),
            availability_url: self.availability_url.clone().filter(|url| !url.is_empty()),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default search locations, highest priority first
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("rover").join("config.toml")),
            Some(PathBuf::from("./rover.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load from default locations or environment
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_first(&Self::default_paths())
    }

    /// Load the first of `paths` that exists, else defaults
    ///
    /// Only absent files are skipped; one that exists but fails to load is
    /// an error.
    pub fn load_first(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        match paths.iter().find(|path| path.exists()) {
            Some(path) => {
                let config = Self::load_with_env(path)?;
                tracing::info!("Loaded config from {:?}", path);
                Ok(config)
            }
            None => {
                tracing::debug!("Using default config with environment overrides");
                Ok(Self::from_env())
            }
        }
    }

    /// Load an explicit file if given, else the default locations
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_with_env(path),
            None => Self::load_default(),
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Archive overrides
        if let Ok(data_dir) = std::env::var("ROVER_DATA_DIR") {
            self.archive.data_dir = data_dir;
        }
        if let Ok(index_path) = std::env::var("ROVER_INDEX_PATH") {
            self.archive.index_path = index_path;
        }

        // Retrieval overrides
        if let Ok(url) = std::env::var("ROVER_DATA_URL") {
            self.retrieval.data_url = url;
        }
        if let Ok(url) = std::env::var("ROVER_AVAILABILITY_URL") {
            self.retrieval.availability_url = Some(url);
        }
        if let Ok(workers) = std::env::var("ROVER_WORKERS") {
            match workers.parse() {
                Ok(n) => self.retrieval.workers = n,
                Err(_) => tracing::warn!("Ignoring ROVER_WORKERS={:?}: not a number", workers),
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("ROVER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ROVER_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check values that would make the archive misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.workers == 0 {
            return Err(ConfigError::InvalidValue(
                "retrieval.workers must be at least 1".to_string(),
            ));
        }
        let multiplier = self.retrieval.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(format!(
                "retrieval.backoff_multiplier must be at least 1.0, got {}",
                self.retrieval.backoff_multiplier
            )));
        }
        if self.archive.merge_tolerance_us < 0 {
            return Err(ConfigError::InvalidValue(format!(
                "archive.merge_tolerance_us must not be negative, got {}",
                self.archive.merge_tolerance_us
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidValue(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.archive.data_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        expand_path(&self.archive.index_path)
    }
}

/// Configuration errors
///
/// Everything here is fatal and reported before any planning starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid stream pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Write the default config to `path`, moving any existing file to `path~`
///
/// Returns the backup location when a file was moved aside.
pub fn write_default_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let io_error = |e: std::io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let backup = if path.exists() {
        let mut name = path.as_os_str().to_owned();
        name.push("~");
        let backup = PathBuf::from(name);
        std::fs::rename(path, &backup).map_err(io_error)?;
        Some(backup)
    } else {
        None
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, generate_default_config()).map_err(io_error)?;
    Ok(backup)
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Rover Configuration
#
# Environment variables override these settings:
# - ROVER_DATA_DIR
# - ROVER_INDEX_PATH
# - ROVER_DATA_URL
# - ROVER_AVAILABILITY_URL
# - ROVER_WORKERS
# - ROVER_LOG_LEVEL
# - ROVER_LOG_FORMAT

[archive]
# Root of the day-partitioned archive (NET/YYYY/DDD/STA.NET.YYYY.DDD)
data_dir = "~/.local/share/rover/mseed"

# SQLite index of archived coverage
index_path = "~/.local/share/rover/index.sqlite"

# Gaps up to this many microseconds are treated as covered
merge_tolerance_us = 0

# Forget index entries whose files were deleted before retrieving
verify_files = true

[retrieval]
# Data service endpoint
data_url = "https://service.iris.edu/fdsnws/dataselect/1/query"

# Availability service endpoint, used to expand wildcard patterns
availability_url = "https://service.iris.edu/fdsnws/availability/1/query"

# Request timeout in seconds
timeout_secs = 60

# Retries for transient failures (timeouts, 429, 5xx)
max_retries = 3
initial_backoff_ms = 500
max_backoff_ms = 30000
backoff_multiplier = 2.0

# Streams fetched concurrently
workers = 5

# Record the whole requested interval as covered when the service
# returns less data than asked for (avoids re-fetching real gaps)
cover_remote_gaps = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/rover/rover.log"
"#
    .to_string()
}
