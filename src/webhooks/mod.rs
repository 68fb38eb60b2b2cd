//! Inbound webhooks
//!
//! - [`dispatcher`]: routes inbound calls by webhook id
//! - [`store`]: durable registration table
//! - [`registry`]: register/unregister/restore for one entry
//! - [`events`]: bus on which received payloads are re-announced

pub mod dispatcher;
pub mod events;
pub mod registry;
pub mod store;

pub use crate::models::DEFAULT_WEBHOOK_NAME;
pub use dispatcher::{
    DispatchError, DispatchOutcome, InboundDispatcher, InboundRequest, WebhookHandler,
};
pub use events::{EventBus, WebhookEvent, EVENT_WEBHOOK_RECEIVED};
pub use registry::{generate_webhook_id, WebhookListing, WebhookRegistry};
pub use store::{StorageError, WebhookStore};

/// `local_only` applied when a registration does not say
pub const DEFAULT_LOCAL_ONLY: bool = true;
