//! Inbound webhook dispatcher
//!
//! Routes `POST /api/webhook/{id}` calls to the handler bound to that id.
//! Every call is acknowledged with 200, whether or not it was delivered, so
//! senders cannot tell which ids exist.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Path prefix under which inbound webhooks are served
pub const WEBHOOK_PATH_PREFIX: &str = "/api/webhook";

/// Errors from dispatcher bookkeeping
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("webhook id '{0}' is already bound")]
    AlreadyBound(String),

    /// Ids become a URL path segment
    #[error("invalid webhook id '{0}': use letters, digits, '-' or '_'")]
    InvalidId(String),
}

/// Whether `webhook_id` can be served as a single path segment
pub fn is_valid_webhook_id(webhook_id: &str) -> bool {
    !webhook_id.is_empty()
        && webhook_id.len() <= 128
        && webhook_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Raw inbound call, decoupled from the HTTP framework
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub body: Bytes,
    pub query: HashMap<String, String>,
    pub remote: Option<IpAddr>,
}

/// Callback bound to a webhook id
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, webhook_id: &str, request: InboundRequest);
}

/// What happened to an inbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered,
    UnknownWebhook,
    RejectedNonLocal,
}

impl DispatchOutcome {
    /// HTTP status returned to the sender
    pub fn status(&self) -> u16 {
        200
    }
}

struct Binding {
    name: String,
    local_only: bool,
    handler: Arc<dyn WebhookHandler>,
}

/// Table of webhook id → handler
pub struct InboundDispatcher {
    external_url: String,
    bindings: RwLock<HashMap<String, Binding>>,
}

impl InboundDispatcher {
    /// `external_url` is the base URL senders use to reach this process
    pub fn new(external_url: impl Into<String>) -> Self {
        let external_url = external_url.into().trim_end_matches('/').to_string();
        Self {
            external_url,
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `handler` to `webhook_id`
    pub async fn bind(
        &self,
        webhook_id: &str,
        name: &str,
        local_only: bool,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<(), DispatchError> {
        if !is_valid_webhook_id(webhook_id) {
            return Err(DispatchError::InvalidId(webhook_id.to_string()));
        }

        let mut bindings = self.bindings.write().await;

        if bindings.contains_key(webhook_id) {
            return Err(DispatchError::AlreadyBound(webhook_id.to_string()));
        }

        bindings.insert(
            webhook_id.to_string(),
            Binding {
                name: name.to_string(),
                local_only,
                handler,
            },
        );

        tracing::debug!(webhook_id, name, local_only, "Webhook bound");
        Ok(())
    }

    /// Remove a binding; returns whether it existed
    pub async fn unbind(&self, webhook_id: &str) -> bool {
        let removed = self.bindings.write().await.remove(webhook_id).is_some();
        if removed {
            tracing::debug!(webhook_id, "Webhook unbound");
        }
        removed
    }

    pub async fn is_bound(&self, webhook_id: &str) -> bool {
        self.bindings.read().await.contains_key(webhook_id)
    }

    /// Route an inbound call
    pub async fn dispatch(&self, webhook_id: &str, request: InboundRequest) -> DispatchOutcome {
        let target = {
            let bindings = self.bindings.read().await;
            bindings
                .get(webhook_id)
                .map(|b| (b.name.clone(), b.local_only, Arc::clone(&b.handler)))
        };

        let Some((name, local_only, handler)) = target else {
            tracing::warn!(webhook_id, "Received call for unknown webhook");
            return DispatchOutcome::UnknownWebhook;
        };

        if local_only && !request.remote.is_some_and(is_local_address) {
            tracing::warn!(
                webhook_id,
                name = %name,
                remote = ?request.remote,
                "Rejected non-local call to local-only webhook"
            );
            return DispatchOutcome::RejectedNonLocal;
        }

        tracing::debug!(webhook_id, name = %name, "Dispatching webhook call");
        handler.handle(webhook_id, request).await;
        DispatchOutcome::Delivered
    }

    /// Public URL of a webhook id
    pub fn generate_url(&self, webhook_id: &str) -> String {
        format!("{}{WEBHOOK_PATH_PREFIX}/{webhook_id}", self.external_url)
    }

    pub fn external_url(&self) -> &str {
        &self.external_url
    }
}

/// Loopback, private, link-local or unique-local
pub fn is_local_address(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_local_address(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
