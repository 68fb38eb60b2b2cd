//! Webhook registry for one entry
//!
//! Keeps the in-memory registration table, the dispatcher bindings and the
//! persisted table in step. Mutations are serialized by one async mutex;
//! a failed write rolls back both the table and the binding, so memory,
//! dispatcher and disk never disagree about a committed registration.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::metrics;
use crate::models::{Registration, WebhookInfo};

use super::dispatcher::{DispatchOutcome, InboundDispatcher, InboundRequest, WebhookHandler};
use super::events::{EventBus, WebhookEvent};
use super::store::{WebhookStore, WebhookTable};

// ============================================================================
// Listing
// ============================================================================

/// One registered webhook, as reported by [`WebhookRegistry::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookListing {
    pub webhook_id: String,
    pub name: String,
    pub local_only: bool,
    pub webhook_url: String,
    /// Whether the dispatcher currently routes this id
    pub active: bool,
}

// ============================================================================
// Event forwarding handler
// ============================================================================

/// Turns an inbound call into a [`WebhookEvent`]
struct EventForwarder {
    entry_id: String,
    events: EventBus,
}

#[async_trait]
impl WebhookHandler for EventForwarder {
    async fn handle(&self, webhook_id: &str, request: InboundRequest) {
        let event = inbound_event(&self.entry_id, webhook_id, request);
        let receivers = self.events.publish(event);
        tracing::debug!(webhook_id, receivers, "Webhook event published");
    }
}

/// Build the event for an inbound call; bodies that are empty or not JSON
/// become `{}`
pub fn inbound_event(entry_id: &str, webhook_id: &str, request: InboundRequest) -> WebhookEvent {
    let payload = if request.body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice::<Value>(&request.body).unwrap_or_else(|e| {
            tracing::debug!(webhook_id, error = %e, "Webhook body is not JSON, using empty payload");
            Value::Object(Map::new())
        })
    };

    WebhookEvent {
        entry_id: entry_id.to_string(),
        webhook_id: webhook_id.to_string(),
        payload,
        query: request.query,
        source: request.remote.map(|ip| ip.to_string()),
        received_at: Utc::now(),
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registration manager for one entry's inbound webhooks
pub struct WebhookRegistry {
    entry_id: String,
    dispatcher: Arc<InboundDispatcher>,
    store: WebhookStore,
    handler: Arc<EventForwarder>,
    webhooks: Mutex<WebhookTable>,
}

impl WebhookRegistry {
    pub fn new(
        entry_id: impl Into<String>,
        dispatcher: Arc<InboundDispatcher>,
        store: WebhookStore,
        events: EventBus,
    ) -> Self {
        let entry_id = entry_id.into();
        let handler = Arc::new(EventForwarder {
            entry_id: entry_id.clone(),
            events,
        });

        Self {
            entry_id,
            dispatcher,
            store,
            handler,
            webhooks: Mutex::new(WebhookTable::new()),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn store(&self) -> &WebhookStore {
        &self.store
    }

    /// Load persisted registrations and bind each one
    ///
    /// Entries that fail to bind are logged and skipped; they stay in the
    /// table so a later save does not drop them. Returns the number bound.
    pub async fn initialize(&self) -> Result<usize> {
        let stored = self.store.load().await?;
        let mut table = self.webhooks.lock().await;
        let mut bound = 0;

        for (webhook_id, info) in stored {
            match self
                .dispatcher
                .bind(&webhook_id, &info.name, info.local_only, self.handler.clone())
                .await
            {
                Ok(()) => bound += 1,
                Err(e) => {
                    tracing::warn!(webhook_id = %webhook_id, error = %e, "Failed to restore webhook");
                }
            }
            table.insert(webhook_id, info);
        }

        metrics::set_registered_webhooks(&self.entry_id, bound);
        tracing::info!(entry_id = %self.entry_id, restored = bound, total = table.len(), "Webhooks restored");

        Ok(bound)
    }

    /// Register a webhook
    ///
    /// A known `webhook_id` returns its existing URL without touching the
    /// table. An unknown one is registered under that id; without an id a
    /// fresh 32-hex-char id is generated.
    pub async fn register(
        &self,
        name: &str,
        local_only: bool,
        webhook_id: Option<&str>,
    ) -> Result<Registration> {
        let mut table = self.webhooks.lock().await;

        if let Some(id) = webhook_id {
            if table.contains_key(id) {
                tracing::debug!(webhook_id = id, "Webhook already registered");
                return Ok(self.registration(id));
            }
        }

        let webhook_id = webhook_id.map_or_else(generate_webhook_id, str::to_string);

        self.dispatcher
            .bind(&webhook_id, name, local_only, self.handler.clone())
            .await?;

        table.insert(
            webhook_id.clone(),
            WebhookInfo {
                name: name.to_string(),
                local_only,
            },
        );

        if let Err(e) = self.store.save(&table).await {
            table.remove(&webhook_id);
            self.dispatcher.unbind(&webhook_id).await;
            tracing::error!(webhook_id = %webhook_id, error = %e, "Failed to persist webhook, rolled back");
            return Err(e.into());
        }

        metrics::set_registered_webhooks(&self.entry_id, table.len());
        tracing::info!(webhook_id = %webhook_id, name, local_only, "Webhook registered");

        Ok(self.registration(&webhook_id))
    }

    /// Unregister a webhook; unknown ids are a no-op
    ///
    /// Returns whether the id was registered.
    pub async fn unregister(&self, webhook_id: &str) -> Result<bool> {
        let mut table = self.webhooks.lock().await;

        let Some(info) = table.remove(webhook_id) else {
            tracing::debug!(webhook_id, "Unregister of unknown webhook ignored");
            return Ok(false);
        };

        let was_bound = self.dispatcher.unbind(webhook_id).await;

        if let Err(e) = self.store.save(&table).await {
            if was_bound {
                // Cannot fail: the id was bound a moment ago under this lock.
                let _ = self
                    .dispatcher
                    .bind(webhook_id, &info.name, info.local_only, self.handler.clone())
                    .await;
            }
            table.insert(webhook_id.to_string(), info);
            tracing::error!(webhook_id, error = %e, "Failed to persist unregister, rolled back");
            return Err(e.into());
        }

        metrics::set_registered_webhooks(&self.entry_id, table.len());
        tracing::info!(webhook_id, "Webhook unregistered");
        Ok(true)
    }

    /// Deliver an inbound call; always acknowledged
    pub async fn handle_inbound(
        &self,
        webhook_id: &str,
        request: InboundRequest,
    ) -> DispatchOutcome {
        let outcome = self.dispatcher.dispatch(webhook_id, request).await;
        metrics::record_webhook_received(outcome);
        outcome
    }

    /// Drop every binding and the in-memory table; storage is kept
    pub async fn unload(&self) {
        let mut table = self.webhooks.lock().await;

        for webhook_id in table.keys() {
            self.dispatcher.unbind(webhook_id).await;
        }

        tracing::debug!(entry_id = %self.entry_id, count = table.len(), "Webhooks unloaded");
        table.clear();
        metrics::set_registered_webhooks(&self.entry_id, 0);
    }

    /// Delete the persisted table
    pub async fn remove_storage(&self) -> Result<bool> {
        let _table = self.webhooks.lock().await;
        Ok(self.store.remove().await?)
    }

    pub async fn list(&self) -> Vec<WebhookListing> {
        let table = self.webhooks.lock().await;
        let mut listing = Vec::with_capacity(table.len());

        for (webhook_id, info) in table.iter() {
            listing.push(WebhookListing {
                webhook_id: webhook_id.clone(),
                name: info.name.clone(),
                local_only: info.local_only,
                webhook_url: self.dispatcher.generate_url(webhook_id),
                active: self.dispatcher.is_bound(webhook_id).await,
            });
        }

        listing
    }

    pub async fn contains(&self, webhook_id: &str) -> bool {
        self.webhooks.lock().await.contains_key(webhook_id)
    }

    fn registration(&self, webhook_id: &str) -> Registration {
        Registration {
            webhook_id: webhook_id.to_string(),
            webhook_url: self.dispatcher.generate_url(webhook_id),
        }
    }
}

/// 32 lowercase hex chars from a random UUID
pub fn generate_webhook_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
