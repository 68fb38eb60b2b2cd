//! Integration tests for the webhook registry and its persistence

use bytes::Bytes;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use flowhome_bridge::error::Error;
use flowhome_bridge::webhooks::{
    DispatchOutcome, EventBus, InboundDispatcher, InboundRequest, WebhookRegistry, WebhookStore,
};

const EXTERNAL_URL: &str = "http://bridge.test:8099";

fn registry_in(dir: &Path, events: &EventBus) -> (WebhookRegistry, Arc<InboundDispatcher>) {
    let dispatcher = Arc::new(InboundDispatcher::new(EXTERNAL_URL));
    let registry = WebhookRegistry::new(
        "home",
        Arc::clone(&dispatcher),
        WebhookStore::new(dir, "home"),
        events.clone(),
    );
    (registry, dispatcher)
}

fn temp_path(store_path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", store_path.display()))
}

fn local_call(body: &'static [u8]) -> InboundRequest {
    InboundRequest {
        body: Bytes::from_static(body),
        remote: Some("192.168.1.20".parse().unwrap()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_register_generates_id_and_url() {
    let dir = TempDir::new().unwrap();
    let (registry, dispatcher) = registry_in(dir.path(), &EventBus::default());
    registry.initialize().await.unwrap();

    let registration = registry.register("Doorbell", true, None).await.unwrap();

    assert_eq!(registration.webhook_id.len(), 32);
    assert_eq!(
        registration.webhook_url,
        format!("{EXTERNAL_URL}/api/webhook/{}", registration.webhook_id)
    );
    assert!(dispatcher.is_bound(&registration.webhook_id).await);
    assert!(registry.contains(&registration.webhook_id).await);
}

#[tokio::test]
async fn test_register_known_id_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry_in(dir.path(), &EventBus::default());

    let first = registry.register("Doorbell", true, Some("door")).await.unwrap();
    let before = std::fs::read(registry.store().path()).unwrap();

    let second = registry.register("Renamed", false, Some("door")).await.unwrap();
    let after = std::fs::read(registry.store().path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(before, after);

    let listing = registry.list().await;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "Doorbell");
    assert!(listing[0].local_only);
}

#[tokio::test]
async fn test_registrations_survive_restart() {
    let dir = TempDir::new().unwrap();

    let registration = {
        let (registry, _) = registry_in(dir.path(), &EventBus::default());
        registry.initialize().await.unwrap();
        let registration = registry.register("Garage", false, None).await.unwrap();
        registry.unload().await;
        registration
    };

    let events = EventBus::default();
    let (registry, dispatcher) = registry_in(dir.path(), &events);
    assert_eq!(registry.initialize().await.unwrap(), 1);
    assert!(dispatcher.is_bound(&registration.webhook_id).await);

    let mut rx = events.subscribe();
    let outcome = registry
        .handle_inbound(&registration.webhook_id, local_call(br#"{"open": true}"#))
        .await;
    assert_eq!(outcome, DispatchOutcome::Delivered);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.entry_id, "home");
    assert_eq!(event.webhook_id, registration.webhook_id);
    assert_eq!(event.payload, json!({"open": true}));
    assert_eq!(event.source.as_deref(), Some("192.168.1.20"));
}

#[tokio::test]
async fn test_unregister_removes_binding_and_persists() {
    let dir = TempDir::new().unwrap();
    let (registry, dispatcher) = registry_in(dir.path(), &EventBus::default());

    registry.register("A", true, Some("a")).await.unwrap();
    registry.register("B", true, Some("b")).await.unwrap();

    assert!(registry.unregister("a").await.unwrap());
    assert!(!registry.unregister("a").await.unwrap());
    assert!(!registry.unregister("never-registered").await.unwrap());

    assert!(!dispatcher.is_bound("a").await);
    let stored = registry.store().load().await.unwrap();
    assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["b"]);
}

#[tokio::test]
async fn test_failed_persist_rolls_back_register() {
    let dir = TempDir::new().unwrap();
    let (registry, dispatcher) = registry_in(dir.path(), &EventBus::default());
    registry.register("Kept", true, Some("kept")).await.unwrap();

    std::fs::create_dir(temp_path(registry.store().path())).unwrap();

    let err = registry.register("Lost", true, Some("lost")).await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));

    assert!(!registry.contains("lost").await);
    assert!(!dispatcher.is_bound("lost").await);
    assert!(dispatcher.is_bound("kept").await);

    let stored = registry.store().load().await.unwrap();
    assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["kept"]);
}

#[tokio::test]
async fn test_failed_persist_rolls_back_unregister() {
    let dir = TempDir::new().unwrap();
    let (registry, dispatcher) = registry_in(dir.path(), &EventBus::default());
    registry.register("Kept", true, Some("kept")).await.unwrap();

    std::fs::create_dir(temp_path(registry.store().path())).unwrap();

    assert!(registry.unregister("kept").await.is_err());
    assert!(registry.contains("kept").await);
    assert!(dispatcher.is_bound("kept").await);
}

#[tokio::test]
async fn test_invalid_body_emits_empty_payload() {
    let dir = TempDir::new().unwrap();
    let events = EventBus::default();
    let (registry, _) = registry_in(dir.path(), &events);
    registry.register("Raw", false, Some("raw")).await.unwrap();

    let mut rx = events.subscribe();
    let outcome = registry.handle_inbound("raw", local_call(b"not json")).await;

    assert_eq!(outcome, DispatchOutcome::Delivered);
    assert_eq!(outcome.status(), 200);
    assert_eq!(rx.recv().await.unwrap().payload, json!({}));
}

#[tokio::test]
async fn test_non_local_caller_is_acknowledged_but_dropped() {
    let dir = TempDir::new().unwrap();
    let events = EventBus::default();
    let (registry, _) = registry_in(dir.path(), &events);
    registry.register("Local", true, Some("local")).await.unwrap();

    let mut rx = events.subscribe();
    let request = InboundRequest {
        body: Bytes::from_static(b"{}"),
        remote: Some("203.0.113.9".parse().unwrap()),
        ..Default::default()
    };

    let outcome = registry.handle_inbound("local", request).await;
    assert_eq!(outcome, DispatchOutcome::RejectedNonLocal);
    assert_eq!(outcome.status(), 200);
    assert!(rx.try_recv().is_err());

    let unknown = registry.handle_inbound("nope", local_call(b"{}")).await;
    assert_eq!(unknown, DispatchOutcome::UnknownWebhook);
    assert_eq!(unknown.status(), 200);
}

#[tokio::test]
async fn test_unload_keeps_storage_and_remove_deletes_it() {
    let dir = TempDir::new().unwrap();
    let (registry, dispatcher) = registry_in(dir.path(), &EventBus::default());
    registry.register("Door", true, Some("door")).await.unwrap();

    registry.unload().await;
    assert!(!dispatcher.is_bound("door").await);
    assert!(registry.list().await.is_empty());
    assert!(registry.store().path().exists());

    assert!(registry.remove_storage().await.unwrap());
    assert!(!registry.store().path().exists());
    assert!(!registry.remove_storage().await.unwrap());
}

#[tokio::test]
async fn test_initialize_rejects_corrupt_store() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry_in(dir.path(), &EventBus::default());
    std::fs::write(registry.store().path(), b"{broken").unwrap();

    assert!(matches!(
        registry.initialize().await,
        Err(Error::Storage(_))
    ));
}

#[tokio::test]
async fn test_initialize_skips_unbindable_entries() {
    let dir = TempDir::new().unwrap();
    let store = WebhookStore::new(dir.path(), "home");
    std::fs::write(
        store.path(),
        serde_json::to_vec(&json!({
            "version": 1,
            "key": "flowhome_webhooks_home",
            "data": {
                "good": {"name": "Good", "local_only": true},
                "bad/id": {"name": "Bad", "local_only": true}
            }
        }))
        .unwrap(),
    )
    .unwrap();

    let (registry, dispatcher) = registry_in(dir.path(), &EventBus::default());
    assert_eq!(registry.initialize().await.unwrap(), 1);
    assert!(dispatcher.is_bound("good").await);

    let listing = registry.list().await;
    assert_eq!(listing.len(), 2);
    assert!(listing.iter().any(|w| w.webhook_id == "bad/id" && !w.active));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inbound_calls_interleaved_with_mutations() {
    let dir = TempDir::new().unwrap();
    let events = EventBus::default();
    let (registry, dispatcher) = registry_in(dir.path(), &events);
    let registry = Arc::new(registry);
    registry.register("Stable", false, Some("stable")).await.unwrap();

    let mutations = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for round in 0..10 {
                registry.register("Churn", false, Some("churn")).await.unwrap();
                let other = format!("other-{round}");
                registry.register("Other", false, Some(other.as_str())).await.unwrap();
                assert!(registry.unregister("churn").await.unwrap());
            }
        })
    };

    let calls = (0..60).map(|i| {
        let registry = Arc::clone(&registry);
        let webhook_id = match i % 3 {
            0 => "stable".to_string(),
            1 => "churn".to_string(),
            _ => format!("other-{}", i % 10),
        };
        tokio::spawn(async move {
            let outcome = registry.handle_inbound(&webhook_id, local_call(b"{}")).await;
            (webhook_id, outcome)
        })
    });
    let outcomes = futures::future::join_all(calls).await;
    mutations.await.unwrap();

    for outcome in outcomes {
        let (webhook_id, outcome) = outcome.unwrap();
        assert_eq!(outcome.status(), 200);
        assert_ne!(outcome, DispatchOutcome::RejectedNonLocal);
        if webhook_id == "stable" {
            assert_eq!(outcome, DispatchOutcome::Delivered);
        }
    }

    let mut listed: Vec<String> = registry
        .list()
        .await
        .into_iter()
        .map(|w| w.webhook_id)
        .collect();
    listed.sort();
    let stored: Vec<String> = registry.store().load().await.unwrap().into_keys().collect();
    assert_eq!(listed, stored);
    assert_eq!(stored.len(), 11);
    assert!(!stored.contains(&"churn".to_string()));

    for webhook_id in &stored {
        assert!(dispatcher.is_bound(webhook_id).await, "{webhook_id}");
    }
    assert!(!dispatcher.is_bound("churn").await);
}
