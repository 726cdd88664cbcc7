//! Application configuration module
//!
//! Provides the configuration shared by the REST client, the push channel
//! and the synchronization engine. Values come from a builder, a TOML
//! document, or the process environment (after loading `.env`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECTION_DELAY_MS: u64 = 1000;
const DEFAULT_RECONNECTION_DELAY_MAX_MS: u64 = 5000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_TYPING_TIMEOUT_MS: u64 = 3000;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// REST base URL
    pub server_url: String,
    /// Push channel base URL; derived from `server_url` when unset
    pub socket_url: Option<String>,
    /// Consecutive failed connects before the push channel gives up
    pub reconnection_attempts: u32,
    /// First reconnect delay
    pub reconnection_delay: Duration,
    /// Upper bound for the doubling reconnect delay
    pub reconnection_delay_max: Duration,
    /// WebSocket handshake timeout
    pub connect_timeout: Duration,
    /// How long a typing indicator stays visible
    pub typing_timeout: Duration,
    /// SQLite file remembering attachment names
    pub name_cache_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            socket_url: None,
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: Duration::from_millis(DEFAULT_RECONNECTION_DELAY_MS),
            reconnection_delay_max: Duration::from_millis(DEFAULT_RECONNECTION_DELAY_MAX_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            typing_timeout: Duration::from_millis(DEFAULT_TYPING_TIMEOUT_MS),
            name_cache_path: None,
        }
    }
}

/// On-disk shape of the TOML configuration; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TomlConfig {
    server_url: Option<String>,
    socket_url: Option<String>,
    reconnection_attempts: Option<u32>,
    reconnection_delay_ms: Option<u64>,
    reconnection_delay_max_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    typing_timeout_ms: Option<u64>,
    name_cache_path: Option<PathBuf>,
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if let Some(socket_url) = &self.socket_url {
            let accepted = ["ws://", "wss://", "http://", "https://"];
            if !accepted.iter().any(|scheme| socket_url.starts_with(scheme)) {
                return Err(ConfigError::InvalidUrl(socket_url.clone()));
            }
        }
        if self.reconnection_delay.is_zero() || self.reconnection_delay_max.is_zero() {
            return Err(ConfigError::InvalidValue("reconnection delay must be positive"));
        }
        if self.reconnection_delay > self.reconnection_delay_max {
            return Err(ConfigError::InvalidValue(
                "reconnection delay exceeds its maximum",
            ));
        }
        Ok(())
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut builder = AppConfig::builder();
        if let Some(url) = parsed.server_url {
            builder = builder.server_url(url);
        }
        if let Some(url) = parsed.socket_url {
            builder = builder.socket_url(url);
        }
        if let Some(attempts) = parsed.reconnection_attempts {
            builder = builder.reconnection_attempts(attempts);
        }
        if let Some(ms) = parsed.reconnection_delay_ms {
            builder = builder.reconnection_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parsed.reconnection_delay_max_ms {
            builder = builder.reconnection_delay_max(Duration::from_millis(ms));
        }
        if let Some(ms) = parsed.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = parsed.typing_timeout_ms {
            builder = builder.typing_timeout(Duration::from_millis(ms));
        }
        if let Some(path) = parsed.name_cache_path {
            builder = builder.name_cache_path(path);
        }
        builder.build()
    }

    /// Read `WEBCHAT_*` variables after loading a `.env` file if one exists
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut builder = AppConfig::builder();
        if let Ok(url) = std::env::var("WEBCHAT_SERVER_URL") {
            builder = builder.server_url(url);
        }
        if let Ok(url) = std::env::var("WEBCHAT_SOCKET_URL") {
            builder = builder.socket_url(url);
        }
        if let Ok(raw) = std::env::var("WEBCHAT_RECONNECT_ATTEMPTS") {
            let attempts = raw
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidValue("WEBCHAT_RECONNECT_ATTEMPTS"))?;
            builder = builder.reconnection_attempts(attempts);
        }
        if let Ok(path) = std::env::var("WEBCHAT_NAME_CACHE") {
            builder = builder.name_cache_path(PathBuf::from(path));
        }
        builder.build()
    }

    /// Default location of the attachment-name cache
    pub fn default_name_cache_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("webchat-sync");
        path.push("attachment_names.db");
        path
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    socket_url: Option<String>,
    reconnection_attempts: Option<u32>,
    reconnection_delay: Option<Duration>,
    reconnection_delay_max: Option<Duration>,
    connect_timeout: Option<Duration>,
    typing_timeout: Option<Duration>,
    name_cache_path: Option<PathBuf>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Set the push channel URL
    pub fn socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = Some(attempts);
        self
    }

    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = Some(delay);
        self
    }

    pub fn reconnection_delay_max(mut self, delay: Duration) -> Self {
        self.reconnection_delay_max = Some(delay);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = Some(timeout);
        self
    }

    pub fn name_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.name_cache_path = Some(path.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            server_url: self.server_url.unwrap_or(defaults.server_url),
            socket_url: self.socket_url,
            reconnection_attempts: self
                .reconnection_attempts
                .unwrap_or(defaults.reconnection_attempts),
            reconnection_delay: self.reconnection_delay.unwrap_or(defaults.reconnection_delay),
            reconnection_delay_max: self
                .reconnection_delay_max
                .unwrap_or(defaults.reconnection_delay_max),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            typing_timeout: self.typing_timeout.unwrap_or(defaults.typing_timeout),
            name_cache_path: self.name_cache_path,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
