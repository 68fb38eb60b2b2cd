//! Event relay
//!
//! Forwards every [`WebhookEvent`] to the automation host via HTTP POST.
//!
//! # Payload Format
//!
//! ```json
//! {
//!   "event_type": "flowhome_webhook_received",
//!   "data": {
//!     "entry_id": "home",
//!     "webhook_id": "0f3c...",
//!     "payload": {"chore_id": "c1", "action": "completed"},
//!     "query": {},
//!     "source": "192.168.1.20",
//!     "received_at": "2026-01-01T12:00:00Z"
//!   }
//! }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use flowhome_bridge::relay::{EventRelay, RelayConfig};
//!
//! let config = RelayConfig::new("http://automation.local:8123/api/events/flowhome")
//!     .with_auth_token("long-lived-token")
//!     .with_max_retries(5);
//!
//! let relay = EventRelay::new(config)?;
//! let handle = relay.spawn(events.subscribe());
//! ```

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::metrics;
use crate::webhooks::events::{WebhookEvent, EVENT_WEBHOOK_RECEIVED};

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Target URL; relaying is disabled when unset
    #[serde(default)]
    pub forward_url: Option<String>,
    /// Optional bearer token
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts after the first failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

/// Upper bound accepted for `max_retries`
pub const MAX_RELAY_RETRIES: u32 = 16;

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            forward_url: None,
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

impl RelayConfig {
    pub fn new(forward_url: impl Into<String>) -> Self {
        Self {
            forward_url: Some(forward_url.into()),
            ..Default::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base_ms = base.as_millis() as u64;
        self
    }

    pub fn enabled(&self) -> bool {
        self.forward_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.forward_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("relay forward_url must start with http:// or https://".to_string());
            }
        }

        if self.timeout_secs == 0 {
            return Err("relay timeout must be greater than 0".to_string());
        }

        if self.max_retries > MAX_RELAY_RETRIES {
            return Err(format!(
                "relay max_retries must be at most {MAX_RELAY_RETRIES}"
            ));
        }

        Ok(())
    }
}

/// Relay delivery errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay is not configured")]
    Disabled,

    #[error("invalid relay configuration: {0}")]
    InvalidConfig(String),

    #[error("relay target answered HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Forwards domain events to the automation host
#[derive(Debug, Clone)]
pub struct EventRelay {
    config: RelayConfig,
    url: String,
    client: Client,
}

impl EventRelay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate().map_err(RelayError::InvalidConfig)?;

        let url = config
            .forward_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or(RelayError::Disabled)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            url,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_payload(event: &WebhookEvent) -> serde_json::Value {
        serde_json::json!({
            "event_type": EVENT_WEBHOOK_RECEIVED,
            "data": event,
        })
    }

    /// Deliver one event, retrying with exponential backoff
    ///
    /// 4xx responses are not retried.
    pub async fn deliver(&self, event: &WebhookEvent) -> Result<(), RelayError> {
        let payload = Self::build_payload(event);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(self.config.retry_base_ms, attempt)).await;
                tracing::debug!(
                    attempt = attempt + 1,
                    max = self.config.max_retries + 1,
                    "Retrying relay delivery"
                );
            }

            let mut request = self.client.post(&self.url);
            if let Some(token) = self.config.auth_token.as_deref().filter(|t| !t.is_empty()) {
                request = request.bearer_auth(token);
            }
            for (key, value) in &self.config.headers {
                request = request.header(key, value);
            }

            match request.json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        webhook_id = %event.webhook_id,
                        status = %response.status(),
                        "Event relayed"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    last_error = Some(RelayError::Rejected {
                        status: status.as_u16(),
                        body,
                    });

                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => last_error = Some(RelayError::Transport(e)),
            }
        }

        Err(last_error.unwrap_or(RelayError::Disabled))
    }

    /// Spawn a task relaying every event received on `events`
    pub fn spawn(self, mut events: broadcast::Receiver<WebhookEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(url = %self.url, "Event relay started");

            loop {
                match events.recv().await {
                    Ok(event) => {
                        let result = self.deliver(&event).await;
                        metrics::record_relay(result.is_ok());
                        if let Err(e) = result {
                            tracing::error!(
                                webhook_id = %event.webhook_id,
                                error = %e,
                                "Failed to relay event"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event relay lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            tracing::info!("Event relay stopped");
        })
    }
}

/// Delay before retry number `attempt` (1-based), saturating instead of overflowing
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_validation() {
        assert!(RelayConfig::new("https://example.com/hook").validate().is_ok());
        assert!(RelayConfig::new("example.com/hook").validate().is_err());
        assert!(RelayConfig::default().validate().is_ok());

        let zero_timeout = RelayConfig {
            timeout_secs: 0,
            ..RelayConfig::new("https://example.com")
        };
        assert!(zero_timeout.validate().is_err());

        let too_many_retries = RelayConfig::new("https://example.com").with_max_retries(100);
        assert!(too_many_retries.validate().is_err());
        assert!(matches!(
            EventRelay::new(too_many_retries),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 4), Duration::from_millis(800));
        assert_eq!(backoff_delay(100, 65), Duration::from_millis(u64::MAX));
        assert_eq!(backoff_delay(100, u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_relay_config_builder() {
        let config = RelayConfig::new("https://example.com/hook")
            .with_auth_token("secret")
            .with_header("X-Source", "flowhome")
            .with_max_retries(5)
            .with_retry_base(Duration::from_millis(50));

        assert!(config.enabled());
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.headers["X-Source"], "flowhome");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_ms, 50);
    }

    #[test]
    fn test_disabled_relay() {
        assert!(!RelayConfig::default().enabled());
        assert!(matches!(
            EventRelay::new(RelayConfig::default()),
            Err(RelayError::Disabled)
        ));
    }
}
