//! Client Configuration Settings
//!
//! Explicit configuration structs. Clients only ever receive resolved values;
//! [`AlpacaConfig::from_env`] is the one place that reads the environment.

use std::time::Duration;

use crate::infrastructure::alpaca::auth::{AUTH_TIMEOUT, AuthError, Credentials};
use crate::infrastructure::alpaca::reconnect::ReconnectConfig;

/// Live trading API.
pub const LIVE_BASE_URL: &str = "https://api.alpaca.markets";

/// Paper trading API.
pub const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";

/// Market data REST API.
pub const DATA_BASE_URL: &str = "https://data.alpaca.markets";

/// Market data streaming host.
pub const DATA_STREAM_URL: &str = "https://stream.data.alpaca.markets";

/// Default REST request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Market data feed for the stock stream and REST queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFeed {
    /// IEX (Investors Exchange), available on the free plan.
    #[default]
    Iex,
    /// SIP (Securities Information Processor), full consolidated tape.
    Sip,
}

impl DataFeed {
    /// Parse feed type from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sip" => Self::Sip,
            _ => Self::Iex,
        }
    }

    /// Feed name as used in URLs and the `feed` query parameter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Iex => "iex",
            Self::Sip => "sip",
        }
    }
}

// =============================================================================
// Stream Settings
// =============================================================================

/// Configuration owned by one streaming connection.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint.
    pub url: String,
    /// Account credentials.
    pub credentials: Credentials,
    /// Reconnect and backoff policy.
    pub reconnect: ReconnectConfig,
    /// How long to wait for authorization after the socket opens.
    pub auth_timeout: Duration,
    /// Log every frame at `debug` instead of `trace`.
    pub verbose: bool,
}

impl StreamSettings {
    /// Settings for `url` with default reconnect policy and auth timeout.
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            reconnect: ReconnectConfig::default(),
            auth_timeout: AUTH_TIMEOUT,
            verbose: false,
        }
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Replace the auth timeout.
    #[must_use]
    pub const fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Enable per-frame debug logging.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    /// Trading API base URL.
    pub base_url: String,
    /// Market data REST base URL.
    pub data_base_url: String,
    /// Market data streaming base URL.
    pub data_stream_url: String,
    /// Trading API version segment.
    pub api_version: String,
    /// Account credentials.
    pub credentials: Credentials,
    /// Stock data feed.
    pub feed: DataFeed,
    /// Option data feed (`indicative` or `opra`).
    pub option_feed: String,
    /// Paper trading account.
    pub paper: bool,
    /// Per-frame debug logging on streams.
    pub verbose: bool,
    /// REST request timeout.
    pub timeout: Duration,
    /// Stream reconnect policy.
    pub reconnect: ReconnectConfig,
}

impl AlpacaConfig {
    /// Live-account configuration with default endpoints.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            base_url: LIVE_BASE_URL.to_string(),
            data_base_url: DATA_BASE_URL.to_string(),
            data_stream_url: DATA_STREAM_URL.to_string(),
            api_version: "v2".to_string(),
            credentials,
            feed: DataFeed::default(),
            option_feed: "indicative".to_string(),
            paper: false,
            verbose: false,
            timeout: DEFAULT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Paper-account configuration with default endpoints.
    #[must_use]
    pub fn paper(credentials: Credentials) -> Self {
        Self {
            base_url: PAPER_BASE_URL.to_string(),
            paper: true,
            ..Self::new(credentials)
        }
    }

    /// Create configuration from environment variables, loading `.env` first.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `APCA_API_KEY_ID`, `APCA_API_SECRET_KEY` | key pair |
    /// | `APCA_API_OAUTH` | OAuth token (wins over the key pair) |
    /// | `APCA_API_BASE_URL` | trading API |
    /// | `APCA_DATA_BASE_URL` | market data REST |
    /// | `APCA_API_STREAM_URL` | market data stream |
    /// | `APCA_API_VERSION` | trading API version |
    /// | `APCA_DATA_FEED`, `APCA_OPTION_FEED` | feeds |
    /// | `APCA_PAPER` | `true` selects the paper API when no base URL is set |
    ///
    /// # Errors
    ///
    /// Returns an error if neither an OAuth token nor a complete key pair is
    /// set.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "Failed to load .env file");
        }

        let credentials = match env_nonempty("APCA_API_OAUTH") {
            Some(token) => Credentials::oauth(token)?,
            None => {
                let key_id = required_env("APCA_API_KEY_ID")?;
                let secret_key = required_env("APCA_API_SECRET_KEY")?;
                Credentials::key_pair(key_id, secret_key)?
            }
        };

        let paper = env_nonempty("APCA_PAPER").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let mut config = if paper {
            Self::paper(credentials)
        } else {
            Self::new(credentials)
        };

        if let Some(url) = env_nonempty("APCA_API_BASE_URL") {
            config.base_url = url;
        }
        if let Some(url) = env_nonempty("APCA_DATA_BASE_URL") {
            config.data_base_url = url;
        }
        if let Some(url) = env_nonempty("APCA_API_STREAM_URL") {
            config.data_stream_url = url;
        }
        if let Some(version) = env_nonempty("APCA_API_VERSION") {
            config.api_version = version;
        }
        if let Some(feed) = env_nonempty("APCA_DATA_FEED") {
            config.feed = DataFeed::from_str_case_insensitive(&feed);
        }
        if let Some(feed) = env_nonempty("APCA_OPTION_FEED") {
            config.option_feed = feed;
        }

        Ok(config)
    }

    /// Use another stock feed.
    #[must_use]
    pub const fn with_feed(mut self, feed: DataFeed) -> Self {
        self.feed = feed;
        self
    }

    /// Override the trading API base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the market data REST base URL.
    #[must_use]
    pub fn with_data_base_url(mut self, url: impl Into<String>) -> Self {
        self.data_base_url = url.into();
        self
    }

    /// Override the market data streaming base URL.
    #[must_use]
    pub fn with_data_stream_url(mut self, url: impl Into<String>) -> Self {
        self.data_stream_url = url.into();
        self
    }

    /// Override the REST timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable per-frame debug logging on streams.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Trading REST root, e.g. `https://api.alpaca.markets/v2`.
    #[must_use]
    pub fn trading_api_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.api_version)
    }

    /// Settings for the market data stream: `{stream host}/v2/{feed}`.
    #[must_use]
    pub fn market_data_stream(&self) -> StreamSettings {
        let url = format!(
            "{}/v2/{}",
            websocket_url(&self.data_stream_url),
            self.feed.as_str()
        );
        self.stream_settings(url)
    }

    /// Settings for the trading stream: `{trading host}/stream`.
    #[must_use]
    pub fn trading_stream(&self) -> StreamSettings {
        let url = format!("{}/stream", websocket_url(&self.base_url));
        self.stream_settings(url)
    }

    fn stream_settings(&self, url: String) -> StreamSettings {
        StreamSettings::new(url, self.credentials.clone())
            .with_reconnect(self.reconnect.clone())
            .with_verbose(self.verbose)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Credentials are incomplete.
    #[error(transparent)]
    Credentials(#[from] AuthError),
}

/// Swap an HTTP scheme for the matching WebSocket scheme and drop any
/// trailing slash.
fn websocket_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env_nonempty(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}
