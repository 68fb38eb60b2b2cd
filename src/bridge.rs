//! Bridge context for one configured entry
//!
//! Owns the upstream client, the polling coordinator, the inbound dispatcher,
//! the event bus, the webhook registry and the optional event relay. Built by
//! [`Bridge::setup`], torn down by [`Bridge::unload`] or [`Bridge::remove`].

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::client::{UpstreamApi, UpstreamClient};
use crate::config::Config;
use crate::coordinator::{CoordinatorStatus, PollingCoordinator};
use crate::endpoint::{self, Endpoint};
use crate::error::{Error, Result};
use crate::models::{Registration, Snapshot};
use crate::relay::EventRelay;
use crate::webhooks::{
    DispatchOutcome, EventBus, InboundDispatcher, InboundRequest, WebhookListing,
    WebhookRegistry, WebhookStore,
};

/// Reason sent upstream when a skip does not carry one
pub const DEFAULT_SKIP_REASON: &str = "No reason provided";

/// Summary reported by the health endpoint and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub entry_id: String,
    pub endpoint: String,
    pub coordinator: CoordinatorStatus,
    pub webhooks: usize,
    pub relay_enabled: bool,
    pub event_subscribers: usize,
}

/// Running bridge for one entry
pub struct Bridge {
    entry_id: String,
    endpoint: Endpoint,
    api: Arc<dyn UpstreamApi>,
    coordinator: Arc<PollingCoordinator>,
    events: EventBus,
    registry: WebhookRegistry,
    relay_enabled: bool,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
    relay_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Resolve the endpoint, connect and start polling
    ///
    /// The first refresh is fatal: if it fails, nothing is started and the
    /// upstream error is returned.
    pub async fn setup(config: &Config) -> Result<Arc<Self>> {
        resolve_endpoint(config)?;

        let client = UpstreamClient::new(config.client_config()?)?;
        Self::setup_with_api(config, Arc::new(client)).await
    }

    /// [`setup`](Self::setup) against a caller-supplied upstream
    pub async fn setup_with_api(config: &Config, api: Arc<dyn UpstreamApi>) -> Result<Arc<Self>> {
        let endpoint = resolve_endpoint(config)?;
        let entry_id = config.entry_id()?;

        tracing::info!(entry_id = %entry_id, endpoint = %endpoint, "Setting up bridge");

        let coordinator = Arc::new(PollingCoordinator::new(
            Arc::clone(&api),
            config.poll_interval(),
        ));
        coordinator.first_refresh().await?;

        let dispatcher = Arc::new(InboundDispatcher::new(config.external_url()?));
        let events = EventBus::default();
        let store = WebhookStore::new(&config.webhooks.storage_dir, &entry_id);
        let registry = WebhookRegistry::new(entry_id.clone(), dispatcher, store, events.clone());
        registry.initialize().await?;

        let relay = if config.relay.enabled() {
            Some(
                EventRelay::new(config.relay.clone())
                    .map_err(|e| Error::config(format!("relay: {e}")))?,
            )
        } else {
            None
        };
        let relay_enabled = relay.is_some();
        let relay_handle = relay.map(|relay| relay.spawn(events.subscribe()));

        let poll_handle = coordinator.start();

        tracing::info!(entry_id = %entry_id, relay_enabled, "Bridge ready");

        Ok(Arc::new(Self {
            entry_id,
            endpoint,
            api,
            coordinator,
            events,
            registry,
            relay_enabled,
            poll_handle: Mutex::new(Some(poll_handle)),
            relay_handle: Mutex::new(relay_handle),
        }))
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn coordinator(&self) -> &Arc<PollingCoordinator> {
        &self.coordinator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &WebhookRegistry {
        &self.registry
    }

    /// Last good snapshot
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.coordinator.snapshot()
    }

    /// Mark a chore complete, then request a refresh
    pub async fn complete_chore(&self, chore_id: &str, user_id: &str) -> Result<()> {
        self.api.complete_chore(chore_id, user_id).await?;
        tracing::info!(chore_id, user_id, "Chore completed");

        self.coordinator.request_refresh().await;
        Ok(())
    }

    /// Complete a chore for the default user, then request a refresh
    ///
    /// Returns the credited user id, or `None` without calling upstream when
    /// the household has no users.
    pub async fn quick_complete(&self, chore_id: &str) -> Result<Option<String>> {
        let user_id = self
            .snapshot()
            .and_then(|snapshot| snapshot.default_user().map(|user| user.id.clone()));

        let Some(user_id) = user_id else {
            tracing::warn!(chore_id, "No users to credit, completion ignored");
            return Ok(None);
        };

        self.complete_chore(chore_id, &user_id).await?;
        Ok(Some(user_id))
    }

    /// Skip a chore, then request a refresh
    pub async fn skip_chore(
        &self,
        chore_id: &str,
        user_id: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_SKIP_REASON);

        self.api.skip_chore(chore_id, user_id, reason).await?;
        tracing::info!(chore_id, user_id, reason, "Chore skipped");

        self.coordinator.request_refresh().await;
        Ok(())
    }

    /// On-demand refresh; coalesced with any refresh in flight
    pub async fn refresh_now(&self) -> CoordinatorStatus {
        self.coordinator.request_refresh().await;
        self.coordinator.status()
    }

    pub async fn register_webhook(
        &self,
        name: &str,
        local_only: bool,
        webhook_id: Option<&str>,
    ) -> Result<Registration> {
        self.registry.register(name, local_only, webhook_id).await
    }

    pub async fn unregister_webhook(&self, webhook_id: &str) -> Result<bool> {
        self.registry.unregister(webhook_id).await
    }

    pub async fn webhooks(&self) -> Vec<WebhookListing> {
        self.registry.list().await
    }

    /// Deliver an inbound webhook call
    pub async fn handle_webhook(&self, webhook_id: &str, request: InboundRequest) -> DispatchOutcome {
        self.registry.handle_inbound(webhook_id, request).await
    }

    pub async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            entry_id: self.entry_id.clone(),
            endpoint: self.endpoint.canonical_url(),
            coordinator: self.coordinator.status(),
            webhooks: self.registry.list().await.len(),
            relay_enabled: self.relay_enabled,
            event_subscribers: self.events.subscriber_count(),
        }
    }

    /// Stop polling and relaying, and drop all webhook bindings
    ///
    /// Persisted registrations are kept.
    pub async fn unload(&self) {
        self.coordinator.stop();

        let poll_handle = self.poll_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = poll_handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Polling loop ended abnormally");
            }
        }

        let relay_handle = self.relay_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = relay_handle {
            handle.abort();
        }

        self.registry.unload().await;
        tracing::info!(entry_id = %self.entry_id, "Bridge unloaded");
    }

    /// Unload and delete the persisted registrations
    pub async fn remove(&self) -> Result<()> {
        self.unload().await;
        let removed = self.registry.remove_storage().await?;
        tracing::info!(entry_id = %self.entry_id, removed, "Bridge removed");
        Ok(())
    }
}

/// [`Config::endpoint`] keeping the typed [`EndpointError`](crate::endpoint::EndpointError)
fn resolve_endpoint(config: &Config) -> Result<Endpoint> {
    let upstream = &config.upstream;
    Ok(endpoint::resolve(&upstream.host, upstream.port, upstream.use_ssl)?)
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("entry_id", &self.entry_id)
            .field("endpoint", &self.endpoint)
            .field("relay_enabled", &self.relay_enabled)
            .finish_non_exhaustive()
    }
}
