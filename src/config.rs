use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::models::ListingType;
use crate::services::processor::DEFAULT_MAX_IMAGE_BYTES;
use crate::services::OverflowPolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_blob_path")]
    pub blob_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Only media URLs starting with this prefix are downloaded.
    #[serde(default = "default_media_host_prefix")]
    pub media_host_prefix: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,
    #[serde(default = "default_listing_types")]
    pub listing_types: Vec<ListingType>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub fetch_delay_secs: u64,
    #[serde(default = "default_period")]
    pub fetch_interval_secs: u64,
    #[serde(default = "default_process_delay")]
    pub process_delay_secs: u64,
    #[serde(default = "default_period")]
    pub process_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WorkersConfig {
    /// Maximum concurrent download/commit jobs; 0 means unbounded.
    #[serde(default)]
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueueConfig {
    /// Leave unset for an unbounded queue.
    #[serde(default)]
    pub max_len: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "data/birbhoard.db".to_string()
}

fn default_blob_path() -> String {
    "data/birbs".to_string()
}

fn default_api_base() -> String {
    "https://reddit.com".to_string()
}

fn default_media_host_prefix() -> String {
    "https://i.redd.it/".to_string()
}

fn default_user_agent() -> String {
    concat!("Mozilla/5.0 birbhoard/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_subreddits() -> Vec<String> {
    vec!["birbs".to_string(), "parrots".to_string(), "birb".to_string()]
}

fn default_listing_types() -> Vec<ListingType> {
    vec![ListingType::Hot, ListingType::New]
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_image_bytes() -> u64 {
    DEFAULT_MAX_IMAGE_BYTES
}

fn default_period() -> u64 {
    600 // 10 minutes
}

fn default_process_delay() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_path: default_blob_path(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            media_host_prefix: default_media_host_prefix(),
            user_agent: default_user_agent(),
            subreddits: default_subreddits(),
            listing_types: default_listing_types(),
            connect_timeout_secs: default_connect_timeout(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fetch_delay_secs: 0,
            fetch_interval_secs: default_period(),
            process_delay_secs: default_process_delay(),
            process_interval_secs: default_period(),
        }
    }
}

impl ScheduleConfig {
    pub fn fetch_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_delay_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs.max(1))
    }

    pub fn process_delay(&self) -> Duration {
        Duration::from_secs(self.process_delay_secs)
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_secs(self.process_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        tracing::info!(
            "Feed config: api_base={}, subreddits={:?}, listing_types={:?}",
            config.feed.api_base,
            config.feed.subreddits,
            config.feed.listing_types
        );
        Ok(config)
    }

    /// Load configuration from the first config file found
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["birbhoard.toml", "config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config = Self::parse(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    /// Format: BH_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(val) = var("BH_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("BH_CONF_SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        // Database and storage overrides
        if let Some(val) = var("BH_CONF_DATABASE_PATH") {
            self.database.path = val;
        }
        if let Some(val) = var("BH_CONF_STORAGE_BLOB_PATH") {
            self.storage.blob_path = val;
        }

        // Feed overrides
        if let Some(val) = var("BH_CONF_FEED_API_BASE") {
            self.feed.api_base = val;
        }
        if let Some(val) = var("BH_CONF_FEED_MEDIA_HOST_PREFIX") {
            self.feed.media_host_prefix = val;
        }
        if let Some(val) = var("BH_CONF_FEED_USER_AGENT") {
            if !val.trim().is_empty() {
                self.feed.user_agent = val;
            }
        }
        if let Some(val) = var("BH_CONF_FEED_SUBREDDITS") {
            self.feed.subreddits = split_list(&val);
        }
        if let Some(val) = var("BH_CONF_FEED_LISTING_TYPES") {
            let types: Vec<ListingType> = split_list(&val)
                .iter()
                .filter_map(|s| match s.parse() {
                    Ok(ty) => Some(ty),
                    Err(e) => {
                        tracing::warn!("Ignoring listing type override: {}", e);
                        None
                    }
                })
                .collect();
            if !types.is_empty() {
                self.feed.listing_types = types;
            }
        }
        if let Some(max) = var("BH_CONF_FEED_MAX_IMAGE_BYTES").and_then(|v| v.parse().ok()) {
            self.feed.max_image_bytes = max;
        }

        // Schedule overrides
        if let Some(secs) = var("BH_CONF_SCHEDULE_FETCH_INTERVAL").and_then(|v| v.parse().ok()) {
            self.schedule.fetch_interval_secs = secs;
        }
        if let Some(secs) = var("BH_CONF_SCHEDULE_PROCESS_INTERVAL").and_then(|v| v.parse().ok()) {
            self.schedule.process_interval_secs = secs;
        }
        if let Some(secs) = var("BH_CONF_SCHEDULE_PROCESS_DELAY").and_then(|v| v.parse().ok()) {
            self.schedule.process_delay_secs = secs;
        }

        // Worker overrides
        if let Some(threads) = var("BH_CONF_WORKERS_THREADS").and_then(|v| v.parse().ok()) {
            self.workers.threads = threads;
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&self.storage.blob_path)?;
        Ok(())
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
