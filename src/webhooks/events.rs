//! Domain event bus
//!
//! Inbound webhook payloads are re-announced here. Publishing never blocks:
//! events go into a bounded broadcast channel, slow subscribers lag and
//! having no subscriber at all is fine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Name under which received webhook payloads are announced
pub const EVENT_WEBHOOK_RECEIVED: &str = "flowhome_webhook_received";

/// Default capacity of the broadcast buffer
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// One received webhook call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub entry_id: String,
    pub webhook_id: String,
    pub payload: Value,
    pub query: HashMap<String, String>,
    /// Remote address of the caller, when known
    pub source: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Event name, for consumers that multiplex several buses
    pub fn event_type(&self) -> &'static str {
        EVENT_WEBHOOK_RECEIVED
    }
}

/// Broadcast bus for [`WebhookEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WebhookEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; returns the number of subscribers that will see it
    pub fn publish(&self, event: WebhookEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!("No event subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WebhookEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
