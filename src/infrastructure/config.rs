//! Configuration infrastructure
//!
//! Loading and management of the watcher configuration file.
//!
//! Configuration errors are the only fatal error class in this system:
//! an unparseable file, an impossible interval, or a degenerate
//! threshold aborts startup instead of being papered over.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::domain::alert::ThresholdPolicy;

/// Complete watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Feed location and polling cadence
    pub feed: FeedConfig,

    /// Threshold policy, cooldown, and comparison cadence
    pub alerting: AlertingConfig,

    /// Metadata provider list and enrichment limits
    pub enrichment: EnrichmentConfig,

    /// SQLite location and pool sizing
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Feed polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Path of the CSV price feed
    pub path: PathBuf,

    /// Minutes between feed fingerprint checks
    pub poll_interval_minutes: u64,

    /// Seconds allowed for a single feed read before it counts as failed
    pub read_timeout_seconds: u64,
}

/// Alerting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Minutes between standalone price comparison passes
    pub price_check_interval_minutes: u64,

    /// Selected threshold policy: `{"type": "percentage"|"absolute", "value": n}`
    pub threshold: ThresholdPolicy,

    /// Hours a (book, source) pair is suppressed after an alert triggers
    pub cooldown_hours: u64,

    /// Hours a third-party observation stays eligible for comparison
    pub recency_window_hours: u64,

    /// Seconds allowed for one notification dispatch
    pub dispatch_timeout_seconds: u64,
}

/// Metadata enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Providers in priority order; the first usable answer wins
    pub providers: Vec<ProviderConfig>,

    /// Maximum books enriched per cycle; the rest wait for later cycles
    pub batch_size: u32,

    /// Maximum provider lookups in flight at once
    pub max_concurrent_lookups: usize,
}

/// One metadata provider entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider id: "google-books" or "open-library"
    pub name: String,

    /// Seconds allowed per lookup attempt
    pub timeout_seconds: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Outbound request budget per second for this provider
    pub requests_per_second: u32,
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path; resolved under the platform data dir when absent
    pub path: Option<PathBuf>,

    /// Connection pool size shared by the pipeline and query services
    pub max_connections: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            alerting: AlertingConfig::default(),
            enrichment: EnrichmentConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::FEED_PATH),
            poll_interval_minutes: defaults::FEED_POLL_INTERVAL_MINUTES,
            read_timeout_seconds: defaults::FEED_READ_TIMEOUT_SECONDS,
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            price_check_interval_minutes: defaults::PRICE_CHECK_INTERVAL_MINUTES,
            threshold: ThresholdPolicy::Percentage(defaults::THRESHOLD_PERCENTAGE),
            cooldown_hours: defaults::COOLDOWN_HOURS,
            recency_window_hours: defaults::RECENCY_WINDOW_HOURS,
            dispatch_timeout_seconds: defaults::DISPATCH_TIMEOUT_SECONDS,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig {
                    name: "google-books".to_string(),
                    timeout_seconds: defaults::PROVIDER_TIMEOUT_SECONDS,
                    max_retries: defaults::PROVIDER_MAX_RETRIES,
                    requests_per_second: defaults::GOOGLE_BOOKS_REQUESTS_PER_SECOND,
                },
                ProviderConfig {
                    name: "open-library".to_string(),
                    timeout_seconds: defaults::PROVIDER_TIMEOUT_SECONDS,
                    max_retries: defaults::PROVIDER_MAX_RETRIES,
                    requests_per_second: defaults::OPEN_LIBRARY_REQUESTS_PER_SECOND,
                },
            ],
            batch_size: defaults::ENRICHMENT_BATCH_SIZE,
            max_concurrent_lookups: defaults::ENRICHMENT_MAX_CONCURRENT,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("bookwatch".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl WatcherConfig {
    /// Startup validation. Every rejection here is fatal; the pipeline
    /// would otherwise run with intervals or thresholds that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.feed.poll_interval_minutes == 0 {
            anyhow::bail!("feed.poll_interval_minutes must be at least 1");
        }
        if self.feed.read_timeout_seconds == 0 {
            anyhow::bail!("feed.read_timeout_seconds must be at least 1");
        }
        if self.alerting.price_check_interval_minutes == 0 {
            anyhow::bail!("alerting.price_check_interval_minutes must be at least 1");
        }
        if self.alerting.cooldown_hours == 0 {
            anyhow::bail!("alerting.cooldown_hours must be at least 1");
        }
        if self.alerting.recency_window_hours == 0 {
            anyhow::bail!("alerting.recency_window_hours must be at least 1");
        }
        if self.alerting.dispatch_timeout_seconds == 0 {
            anyhow::bail!("alerting.dispatch_timeout_seconds must be at least 1");
        }
        self.alerting
            .threshold
            .validate()
            .map_err(|reason| anyhow::anyhow!("invalid threshold policy: {reason}"))?;
        if self.enrichment.batch_size == 0 {
            anyhow::bail!("enrichment.batch_size must be at least 1");
        }
        if self.enrichment.max_concurrent_lookups == 0 {
            anyhow::bail!("enrichment.max_concurrent_lookups must be at least 1");
        }
        for provider in &self.enrichment.providers {
            if provider.timeout_seconds == 0 {
                anyhow::bail!("provider '{}' timeout_seconds must be at least 1", provider.name);
            }
            if provider.requests_per_second == 0 {
                anyhow::bail!(
                    "provider '{}' requests_per_second must be at least 1",
                    provider.name
                );
            }
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.feed.poll_interval_minutes * 60)
    }

    pub fn price_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.alerting.price_check_interval_minutes * 60)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.alerting.cooldown_hours as i64)
    }

    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.alerting.recency_window_hours as i64)
    }

    pub fn dispatch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.alerting.dispatch_timeout_seconds)
    }

    /// Resolve the SQLite file path, falling back to the platform data dir.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }
        let data_dir = ConfigManager::get_app_data_dir()?;
        Ok(data_dir.join("database").join("bookwatch.db"))
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("bookwatch");

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join("bookwatch");

        Ok(data_dir)
    }

    /// Create a new configuration manager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        let config_path = config_dir.join("bookwatch_config.json");

        Ok(Self { config_path })
    }

    /// Create a manager bound to an explicit file, for tests and overrides
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Initialize configuration on first run: create the config directory,
    /// write the default file, and prepare the data directories.
    pub async fn initialize_on_first_run(&self) -> Result<WatcherConfig> {
        let config_dir = self
            .config_path
            .parent()
            .context("Failed to get config directory")?;

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)
                .await
                .context("Failed to create config directory")?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        let is_first_run = !self.config_path.exists();

        if is_first_run {
            info!("First run detected - initializing default configuration");
            let default_config = WatcherConfig::default();
            self.save_config(&default_config).await?;
            self.create_data_directories().await?;
            Ok(default_config)
        } else {
            self.load_config().await
        }
    }

    /// Create necessary data directories
    async fn create_data_directories(&self) -> Result<()> {
        let app_data_dir = Self::get_app_data_dir()?;

        let directories = [app_data_dir.join("database"), app_data_dir.join("logs")];

        for dir in &directories {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create directory: {:?}", dir))?;
                info!("Created directory: {:?}", dir);
            }
        }

        Ok(())
    }

    /// Load configuration from file, creating the default if it doesn't exist.
    /// A file that exists but fails to parse or validate is a startup error,
    /// never silently replaced.
    pub async fn load_config(&self) -> Result<WatcherConfig> {
        if !self.config_path.exists() {
            info!(
                "Configuration file not found, creating default: {:?}",
                self.config_path
            );
            let default_config = WatcherConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        let config: WatcherConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration file: {:?}", self.config_path))?;
        config.validate()?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub async fn save_config(&self, config: &WatcherConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let json = serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration")?;
        fs::write(&self.config_path, json)
            .await
            .context("Failed to write configuration file")?;

        Ok(())
    }
}

/// Default values for the configuration file
pub mod defaults {
    /// Default feed path, relative to the working directory
    pub const FEED_PATH: &str = "data/books.csv";

    /// Default minutes between feed fingerprint checks
    pub const FEED_POLL_INTERVAL_MINUTES: u64 = 30;

    /// Default seconds allowed for one feed read
    pub const FEED_READ_TIMEOUT_SECONDS: u64 = 10;

    /// Default minutes between standalone price comparison passes
    pub const PRICE_CHECK_INTERVAL_MINUTES: u64 = 360;

    /// Default percentage threshold
    pub const THRESHOLD_PERCENTAGE: f64 = 10.0;

    /// Default hours a (book, source) pair is suppressed after an alert
    pub const COOLDOWN_HOURS: u64 = 24;

    /// Default hours a third-party observation stays comparable
    pub const RECENCY_WINDOW_HOURS: u64 = 72;

    /// Default seconds allowed for one notification dispatch
    pub const DISPATCH_TIMEOUT_SECONDS: u64 = 5;

    /// Default seconds allowed per provider lookup attempt
    pub const PROVIDER_TIMEOUT_SECONDS: u64 = 10;

    /// Default retries after the first provider attempt
    pub const PROVIDER_MAX_RETRIES: u32 = 2;

    /// Google Books free tier is generous but rate limit anyway
    pub const GOOGLE_BOOKS_REQUESTS_PER_SECOND: u32 = 1;

    /// Open Library is more permissive
    pub const OPEN_LIBRARY_REQUESTS_PER_SECOND: u32 = 2;

    /// Default maximum books enriched per cycle
    pub const ENRICHMENT_BATCH_SIZE: u32 = 25;

    /// Default maximum provider lookups in flight
    pub const ENRICHMENT_MAX_CONCURRENT: usize = 4;

    /// Default connection pool size
    pub const DB_MAX_CONNECTIONS: u32 = 10;

    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON log format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = false;
}
