//! Configuration management for flowhome-bridge
//!
//! Configuration is loaded from `FLOWHOME_*` environment variables or from a
//! TOML file. Every section has defaults, so a file only needs the keys it
//! changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::ClientConfig;
use crate::endpoint::{self, Endpoint};
use crate::relay::RelayConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream FlowHome service
    pub upstream: UpstreamConfig,

    /// Polling schedule
    pub polling: PollingConfig,

    /// Inbound webhooks
    pub webhooks: WebhooksConfig,

    /// Control API and webhook listener
    pub server: ServerConfig,

    /// Outbound event relay
    pub relay: RelayConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream connection settings, resolved through [`endpoint::resolve`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Hostname, `host:port` or full URL
    pub host: String,

    /// Port used when `host` does not carry one, 8080 by default
    pub port: Option<u16>,

    /// Force TLS on or off; inferred when unset
    pub use_ssl: Option<bool>,

    /// Bearer token
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: Some(endpoint::DEFAULT_PORT),
            use_ssl: None,
            api_key: None,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Inbound webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    /// Entry id; defaults to the upstream host when unset
    pub entry_id: Option<String>,

    /// Directory holding the persisted registration tables
    pub storage_dir: PathBuf,

    /// Base URL senders use to reach this process; derived from the bind
    /// address when unset
    pub external_url: Option<String>,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            entry_id: None,
            storage_dir: PathBuf::from("data"),
            external_url: None,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub enable_cors: bool,
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0:8099"),
            enable_cors: true,
            enable_request_logging: true,
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
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let upstream = UpstreamConfig {
            host: env_string("FLOWHOME_HOST").unwrap_or(defaults.upstream.host),
            port: env_parse("FLOWHOME_PORT").or(defaults.upstream.port),
            use_ssl: env_parse("FLOWHOME_USE_SSL"),
            api_key: env_string("FLOWHOME_API_KEY"),
            request_timeout_secs: env_parse("FLOWHOME_REQUEST_TIMEOUT")
                .unwrap_or(defaults.upstream.request_timeout_secs),
        };

        let polling = PollingConfig {
            interval_secs: env_parse("FLOWHOME_POLL_INTERVAL")
                .unwrap_or(defaults.polling.interval_secs),
        };

        let webhooks = WebhooksConfig {
            entry_id: env_string("FLOWHOME_ENTRY_ID"),
            storage_dir: env_string("FLOWHOME_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.webhooks.storage_dir),
            external_url: env_string("FLOWHOME_EXTERNAL_URL"),
        };

        let server = ServerConfig {
            bind_address: env_string("FLOWHOME_BIND_ADDRESS")
                .unwrap_or(defaults.server.bind_address),
            enable_cors: env_parse("FLOWHOME_ENABLE_CORS").unwrap_or(defaults.server.enable_cors),
            enable_request_logging: env_parse("FLOWHOME_REQUEST_LOGGING")
                .unwrap_or(defaults.server.enable_request_logging),
        };

        let mut relay = RelayConfig {
            forward_url: env_string("FLOWHOME_RELAY_URL"),
            auth_token: env_string("FLOWHOME_RELAY_TOKEN"),
            ..defaults.relay
        };
        if let Some(retries) = env_parse("FLOWHOME_RELAY_MAX_RETRIES") {
            relay.max_retries = retries;
        }

        let logging = LoggingConfig {
            level: env_string("FLOWHOME_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: env_string("FLOWHOME_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            upstream,
            polling,
            webhooks,
            server,
            relay,
            logging,
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
        self.endpoint()?;

        if self.upstream.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.polling.interval_secs == 0 {
            anyhow::bail!("polling interval_secs must be greater than 0");
        }

        if let Some(entry_id) = &self.webhooks.entry_id {
            if entry_id.trim().is_empty() {
                anyhow::bail!("webhooks entry_id must not be empty");
            }
        }

        self.bind_address()?;

        if let Some(url) = &self.webhooks.external_url {
            url::Url::parse(url).with_context(|| format!("Invalid external_url: {url}"))?;
        }

        self.relay.validate().map_err(anyhow::Error::msg)?;

        Ok(())
    }

    /// Resolve the upstream endpoint
    pub fn endpoint(&self) -> Result<Endpoint> {
        endpoint::resolve(
            &self.upstream.host,
            self.upstream.port,
            self.upstream.use_ssl,
        )
        .with_context(|| format!("Invalid upstream host: {}", self.upstream.host))
    }

    /// Build the client configuration for the resolved endpoint
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(self.endpoint()?).with_timeout(self.request_timeout());
        if let Some(key) = self.upstream.api_key.as_deref() {
            config = config.with_api_key(key);
        }
        Ok(config)
    }

    /// Entry id, falling back to the endpoint's unique id
    pub fn entry_id(&self) -> Result<String> {
        match &self.webhooks.entry_id {
            Some(id) => Ok(id.trim().to_string()),
            None => Ok(self.endpoint()?.unique_id().to_string()),
        }
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))
    }

    /// Base URL used in generated webhook URLs
    pub fn external_url(&self) -> Result<String> {
        if let Some(url) = &self.webhooks.external_url {
            return Ok(url.trim_end_matches('/').to_string());
        }

        let addr = self.bind_address()?;
        let host = if addr.ip().is_unspecified() {
            String::from("localhost")
        } else {
            addr.ip().to_string()
        };
        Ok(format!("http://{host}:{}", addr.port()))
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.request_timeout_secs)
    }

    /// Get polling interval as Duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs)
    }
}
