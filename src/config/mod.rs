//! Configuration management for the epicfree notifier
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::DEFAULT_ENDPOINTS;
use crate::scheduler::{DEFAULT_INTERVAL_HOURS, INTERVAL_RANGE};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog source configuration
    pub catalog: CatalogConfig,

    /// Promotion cache configuration
    pub cache: CacheConfig,

    /// Broadcast throttling
    pub broadcast: BroadcastConfig,

    /// Recurring check
    pub scheduler: SchedulerConfig,

    /// Telegram transport
    pub telegram: TelegramConfig,

    /// Recipient directory files
    pub directory: DirectoryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Catalog source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Endpoints in priority order
    pub endpoints: Vec<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            request_timeout_secs: 15,
        }
    }
}

impl CatalogConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Promotion cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot time-to-live in seconds (default: 5 minutes)
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Broadcast throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Pause after every delivery attempt in milliseconds
    pub message_delay_ms: u64,

    /// Recipients between progress snapshots
    pub progress_batch: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: 100,
            progress_batch: 50,
        }
    }
}

impl BroadcastConfig {
    #[must_use]
    pub fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms)
    }
}

/// Recurring check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Start the recurring check on launch
    pub enabled: bool,

    /// Hours between checks, 1-24
    pub interval_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: DEFAULT_INTERVAL_HOURS,
        }
    }
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token (required to deliver messages)
    pub bot_token: Option<String>,

    /// API base URL
    pub api_base: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: String::from("https://api.telegram.org"),
            timeout_secs: 30,
        }
    }
}

/// Recipient directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Users file (object keyed by user id)
    pub users_path: PathBuf,

    /// Ban list file (object keyed by user id)
    pub banned_path: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            users_path: PathBuf::from("data/users.json"),
            banned_path: PathBuf::from("data/banned.json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparseable variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let endpoints = std::env::var("EPICFREE_CATALOG_ENDPOINTS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|endpoints| !endpoints.is_empty())
            .unwrap_or(defaults.catalog.endpoints);

        let request_timeout_secs = env_parse("EPICFREE_REQUEST_TIMEOUT")
            .unwrap_or(defaults.catalog.request_timeout_secs);

        let ttl_secs = env_parse("EPICFREE_CACHE_TTL").unwrap_or(defaults.cache.ttl_secs);

        let message_delay_ms = env_parse("EPICFREE_MESSAGE_DELAY_MS")
            .unwrap_or(defaults.broadcast.message_delay_ms);

        let progress_batch = env_parse("EPICFREE_PROGRESS_BATCH")
            .unwrap_or(defaults.broadcast.progress_batch);

        let enabled = env_bool("EPICFREE_AUTO_CHECK").unwrap_or(defaults.scheduler.enabled);

        let interval_hours = env_parse("EPICFREE_CHECK_INTERVAL")
            .unwrap_or(defaults.scheduler.interval_hours);

        let bot_token = std::env::var("EPICFREE_TELEGRAM_TOKEN")
            .or_else(|_| std::env::var("BOT_TOKEN"))
            .ok()
            .filter(|t| !t.trim().is_empty());

        let api_base = std::env::var("EPICFREE_TELEGRAM_API_BASE")
            .unwrap_or(defaults.telegram.api_base);

        let data_dir = std::env::var("EPICFREE_DATA_DIR").ok().map(PathBuf::from);

        let users_path = std::env::var("EPICFREE_USERS_PATH")
            .map(PathBuf::from)
            .ok()
            .or_else(|| data_dir.as_ref().map(|d| d.join("users.json")))
            .unwrap_or(defaults.directory.users_path);

        let banned_path = std::env::var("EPICFREE_BANNED_PATH")
            .map(PathBuf::from)
            .ok()
            .or_else(|| data_dir.as_ref().map(|d| d.join("banned.json")))
            .unwrap_or(defaults.directory.banned_path);

        let level = std::env::var("EPICFREE_LOG_LEVEL").unwrap_or(defaults.logging.level);

        let format = std::env::var("EPICFREE_LOG_FORMAT").unwrap_or(defaults.logging.format);

        Ok(Self {
            catalog: CatalogConfig {
                endpoints,
                request_timeout_secs,
            },
            cache: CacheConfig { ttl_secs },
            broadcast: BroadcastConfig {
                message_delay_ms,
                progress_batch,
            },
            scheduler: SchedulerConfig {
                enabled,
                interval_hours,
            },
            telegram: TelegramConfig {
                bot_token,
                api_base,
                timeout_secs: defaults.telegram.timeout_secs,
            },
            directory: DirectoryConfig {
                users_path,
                banned_path,
            },
            logging: LoggingConfig { level, format },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.catalog.endpoints.is_empty() {
            anyhow::bail!("at least one catalog endpoint is required");
        }

        for endpoint in &self.catalog.endpoints {
            let url = url::Url::parse(endpoint)
                .with_context(|| format!("invalid catalog endpoint: {endpoint}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("catalog endpoint must use http or https: {endpoint}");
            }
        }

        if self.catalog.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.broadcast.progress_batch == 0 {
            anyhow::bail!("progress_batch must be greater than 0");
        }

        if !INTERVAL_RANGE.contains(&self.scheduler.interval_hours) {
            anyhow::bail!(
                "interval_hours must be between 1 and 24, got {}",
                self.scheduler.interval_hours
            );
        }

        url::Url::parse(&self.telegram.api_base)
            .with_context(|| format!("invalid telegram api_base: {}", self.telegram.api_base))?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging format must be 'text' or 'json'");
        }

        Ok(())
    }
}
