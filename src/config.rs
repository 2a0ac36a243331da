use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::{validate_address, PollingConfig};
use crate::error::ConfigError;
use crate::retry::RetryConfig;
use crate::rules::AlertRule;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub watcher: WatcherSettings,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

/// RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Attempts per block fetch, including the first
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
}

/// Chain watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Addresses whose transactions are watched
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Head polling interval in seconds
    pub poll_interval_seconds: u64,
    /// Blocks a header must be buried under before it is processed
    pub confirmations: u64,
    /// Failed polls in a row before the subscription is declared dead
    pub max_consecutive_failures: u32,
    /// Capacity of the header and transaction channels
    pub channel_capacity: usize,
    /// Wait before resubscribing after a stream closes
    pub restart_delay_seconds: u64,
}

/// Notification sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Call sinks concurrently instead of one after another
    #[serde(default)]
    pub concurrent: bool,
    /// Also write every alert to the application log
    #[serde(default = "default_true")]
    pub log: bool,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
    #[serde(default)]
    pub telegram: Vec<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// Enables HMAC signing when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    pub name: String,
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

fn default_true() -> bool {
    true
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://polygon-rpc.com/".to_string(),
            timeout_seconds: 30,
            max_retries: 5,
            retry_delay_ms: 500,
            max_retry_delay_ms: 30_000,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            poll_interval_seconds: 2,
            confirmations: 0,
            max_consecutive_failures: 5,
            channel_capacity: 256,
            restart_delay_seconds: 15,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            concurrent: false,
            log: true,
            webhooks: Vec::new(),
            telegram: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl RpcConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_delay_ms: self.retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            ..RetryConfig::for_rpc()
        }
    }
}

impl WatcherSettings {
    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            confirmations: self.confirmations,
            max_consecutive_failures: self.max_consecutive_failures,
            channel_capacity: self.channel_capacity,
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_seconds)
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: raw }),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl AppConfig {
    /// Load configuration from `CONFIG_FILE` (default `config.toml`) and
    /// environment variables. Environment variables take precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Same as [`load`](Self::load) with an explicit file path
    pub fn load_with_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file named by `CONFIG_FILE`
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_path(Path::new(&config_path))
    }

    /// A missing file yields the defaults; a malformed one is an error
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // RPC configuration
        if let Ok(endpoint) = env::var("RPC_URL") {
            self.rpc.endpoint = endpoint;
        }
        if let Some(timeout) = env_value("RPC_TIMEOUT_SECONDS")? {
            self.rpc.timeout_seconds = timeout;
        }
        if let Some(retries) = env_value("RPC_MAX_RETRIES")? {
            self.rpc.max_retries = retries;
        }

        // Watcher configuration
        if let Ok(addresses) = env::var("WATCH_ADDRESSES") {
            self.watcher.addresses = addresses
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(interval) = env_value("POLL_INTERVAL_SECONDS")? {
            self.watcher.poll_interval_seconds = interval;
        }
        if let Some(confirmations) = env_value("CONFIRMATIONS")? {
            self.watcher.confirmations = confirmations;
        }

        // Notification configuration
        if let Some(concurrent) = env_value("FANOUT_CONCURRENT")? {
            self.notifications.concurrent = concurrent;
        }

        // Logging configuration
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.rpc.endpoint) {
            return Err(ConfigError::InvalidUrl(self.rpc.endpoint.clone()));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(invalid("rpc.timeout_seconds", self.rpc.timeout_seconds));
        }

        if self.rpc.max_retries == 0 || self.rpc.max_retries > 20 {
            return Err(invalid("rpc.max_retries", self.rpc.max_retries));
        }

        if self.watcher.poll_interval_seconds == 0 || self.watcher.poll_interval_seconds > 300 {
            return Err(invalid("watcher.poll_interval_seconds", self.watcher.poll_interval_seconds));
        }

        if self.watcher.max_consecutive_failures == 0 {
            return Err(invalid("watcher.max_consecutive_failures", self.watcher.max_consecutive_failures));
        }

        if self.watcher.channel_capacity == 0 {
            return Err(invalid("watcher.channel_capacity", self.watcher.channel_capacity));
        }

        for address in &self.watcher.addresses {
            validate_address(address).map_err(|_| invalid("watcher.addresses", address))?;
        }

        let mut rule_names = HashSet::new();
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                return Err(invalid("rules.name", &rule.name));
            }
            if !rule_names.insert(rule.name.as_str()) {
                return Err(invalid("rules.name", format!("duplicate rule '{}'", rule.name)));
            }
        }

        for webhook in &self.notifications.webhooks {
            if !is_http_url(&webhook.url) {
                return Err(ConfigError::InvalidUrl(webhook.url.clone()));
            }
        }

        for telegram in &self.notifications.telegram {
            if telegram.bot_token.trim().is_empty() {
                return Err(invalid("notifications.telegram.bot_token", &telegram.name));
            }
            if telegram.chat_id.trim().is_empty() {
                return Err(invalid("notifications.telegram.chat_id", &telegram.name));
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging.level", &self.logging.level));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid("logging.format", &self.logging.format));
        }

        Ok(())
    }

    /// Defaults plus one watched address, a `big-tx` rule and its webhook
    pub fn sample() -> Self {
        let mut config = Self::default();
        config.watcher.addresses = vec!["0xf977814e90da44bfa03b6295a0616a897441acec".to_string()];
        config.rules = vec![AlertRule::new("big-tx")
            .with_description("Transfer above 10 native units")
            .with_condition(crate::rules::RuleCondition::new("value", ">", 10.0))
            .with_channel("ops-webhook")
            .with_cooldown(Duration::from_secs(60))];
        config.notifications.webhooks = vec![WebhookConfig {
            name: "ops-webhook".to_string(),
            url: "https://example.com/hooks/alerts".to_string(),
            secret: None,
        }];
        config
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::sample()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| ConfigError::InvalidValue { key: path.display().to_string(), value: e.to_string() })?;
        Ok(())
    }
}
