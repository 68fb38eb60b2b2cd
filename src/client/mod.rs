//! HTTP client for the FlowHome REST API
//!
//! All requests go to `<endpoint>/api<path>`, carry a bearer token when an
//! API key is configured, and are bounded by the configured timeout.
//! Transport errors never leave this module as `reqwest` types; they are
//! translated into [`UpstreamError`].

pub mod error;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::endpoint::Endpoint;

pub use error::{UnavailableCause, UpstreamError};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Title used when the upstream does not report a household name
pub const DEFAULT_TITLE: &str = "FlowHome";

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the upstream client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Resolved upstream endpoint
    pub endpoint: Endpoint,

    /// Opaque bearer token; `None` or empty means anonymous access
    pub api_key: Option<String>,

    /// Request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a new client config
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Upstream API trait
// ============================================================================

/// Operations the coordinator and bridge need from the upstream
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Service metadata (household name, version)
    async fn get_info(&self) -> Result<Value, UpstreamError>;

    /// Raw chore collection
    async fn get_chores(&self) -> Result<Value, UpstreamError>;

    /// Raw user collection
    async fn get_users(&self) -> Result<Value, UpstreamError>;

    /// Aggregate standings, `None` when the upstream has none
    async fn get_leaderboard(&self) -> Result<Option<Value>, UpstreamError>;

    /// Mark a chore complete for a user
    async fn complete_chore(&self, chore_id: &str, user_id: &str) -> Result<(), UpstreamError>;

    /// Skip a chore for a user
    async fn skip_chore(
        &self,
        chore_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), UpstreamError>;
}

/// Result of a connection test
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Household name, or `"FlowHome"`
    pub title: String,

    /// Reported upstream version, if any
    pub version: Option<String>,

    /// Raw `/info` document
    pub info: Value,
}

// ============================================================================
// Upstream Client
// ============================================================================

/// Client for the FlowHome REST API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    config: ClientConfig,
    http_client: Client,
    base_url: Url,
}

impl UpstreamClient {
    /// Create a new upstream client
    pub fn new(config: ClientConfig) -> Result<Self, UpstreamError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("flowhome-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = Url::parse(&config.endpoint.api_base_url())
            .map_err(|e| UpstreamError::transport(format!("invalid base URL: {e}")))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    /// Endpoint this client talks to
    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    /// Whether requests carry an `Authorization` header
    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Issue a request against `<api base><path>` and decode the JSON body
    ///
    /// An empty body decodes to `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let url = self.url_for(path)?;
        let response = self.send(method, url, body).await?;
        let response = check_status(response).await?;
        decode_json(response).await
    }

    /// Test the connection by fetching `/info`
    pub async fn validate(&self) -> Result<ConnectionInfo, UpstreamError> {
        let info = self.get_info().await?;

        let title = info
            .get("household_name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();

        let version = info.get("version").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        tracing::debug!(endpoint = %self.config.endpoint, %title, "Upstream connection validated");

        Ok(ConnectionInfo {
            title,
            version,
            info,
        })
    }

    fn api_key(&self) -> Option<&str> {
        self.config.api_key.as_deref().filter(|k| !k.is_empty())
    }

    fn url_for(&self, path: &str) -> Result<Url, UpstreamError> {
        let raw = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| UpstreamError::transport(format!("invalid URL {raw}: {e}")))
    }

    fn chore_action_url(&self, chore_id: &str, action: &str) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| UpstreamError::transport("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["chores", chore_id, action]);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Response, UpstreamError> {
        tracing::trace!(%method, %url, "Upstream request");

        let mut builder = self.http_client.request(method, url);
        if let Some(key) = self.api_key() {
            builder = builder.bearer_auth(key);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    async fn post_action(&self, url: Url, body: Value) -> Result<(), UpstreamError> {
        let response = self.send(Method::POST, url, Some(&body)).await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl UpstreamApi for UpstreamClient {
    async fn get_info(&self) -> Result<Value, UpstreamError> {
        self.request(Method::GET, "/info", None).await
    }

    async fn get_chores(&self) -> Result<Value, UpstreamError> {
        self.request(Method::GET, "/chores", None).await
    }

    async fn get_users(&self) -> Result<Value, UpstreamError> {
        self.request(Method::GET, "/users", None).await
    }

    async fn get_leaderboard(&self) -> Result<Option<Value>, UpstreamError> {
        let url = self.url_for("/leaderboard")?;
        let response = self.send(Method::GET, url, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Upstream has no leaderboard endpoint");
            return Ok(None);
        }

        let response = check_status(response).await?;
        let value = decode_json(response).await?;

        Ok(match &value {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            Value::Array(items) if items.is_empty() => None,
            _ => Some(value),
        })
    }

    async fn complete_chore(&self, chore_id: &str, user_id: &str) -> Result<(), UpstreamError> {
        let url = self.chore_action_url(chore_id, "complete")?;
        self.post_action(url, json!({ "user_id": user_id })).await
    }

    async fn skip_chore(
        &self,
        chore_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), UpstreamError> {
        let url = self.chore_action_url(chore_id, "skip")?;
        self.post_action(url, json!({ "user_id": user_id, "reason": reason }))
            .await
    }
}

/// Map non-2xx statuses to errors, keeping 401/403 distinct
async fn check_status(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(UpstreamError::AuthenticationRejected {
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::status(status.as_u16(), body.trim()));
    }

    Ok(response)
}

async fn decode_json(response: Response) -> Result<Value, UpstreamError> {
    let bytes = response.bytes().await?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&bytes).map_err(|e| UpstreamError::invalid_body(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
