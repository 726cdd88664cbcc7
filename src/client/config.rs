use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Client configuration: endpoints plus the signed-in identity.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
    token: Option<String>,
    user_id: Option<i64>,
}

impl Config {
    pub fn new(app: AppConfig) -> Self {
        Self {
            app,
            token: None,
            user_id: None,
        }
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::new(builder.build()?))
    }

    /// Load from the environment (`.env` honoured), including
    /// `WEBCHAT_TOKEN` and `WEBCHAT_USER_ID` when present
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(AppConfig::from_env()?);
        config.token = std::env::var("WEBCHAT_TOKEN").ok().filter(|t| !t.is_empty());
        config.user_id = match std::env::var("WEBCHAT_USER_ID") {
            Ok(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("WEBCHAT_USER_ID"))?,
            ),
            Err(_) => None,
        };
        Ok(config)
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Set the opaque bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn set_user_id(&mut self, user_id: Option<i64>) {
        self.user_id = user_id;
    }

    /// Local user id; messages with this sender are ours
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn server_url(&self) -> &str {
        &self.app.server_url
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url(), path)
    }

    /// WebSocket endpoint of the push channel
    pub fn socket_url(&self) -> String {
        let base = self.app.socket_url.as_deref().unwrap_or(&self.app.server_url);
        let base = base.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", base, SOCKET_IO_PATH)
    }
}
