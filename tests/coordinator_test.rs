//! Integration tests for the polling coordinator

mod common;

use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::ScriptedApi;
use flowhome_bridge::coordinator::{render, PollingCoordinator};
use flowhome_bridge::models::LeaderboardSource;

#[tokio::test]
async fn test_snapshot_is_normalized() {
    let api = Arc::new(ScriptedApi::default());
    let coordinator = PollingCoordinator::with_default_interval(api);

    let snapshot = coordinator.first_refresh().await.unwrap();

    assert_eq!(snapshot.version, "1.4.2");
    assert_eq!(snapshot.household_name(), Some("Casa Verde"));
    assert_eq!(snapshot.chores.len(), 2);

    let dishes = snapshot.chore("c1").unwrap();
    assert_eq!(dishes.title, "Dishes");
    assert_eq!(dishes.points, Some(5));
    assert_eq!(dishes.assigned_to.as_deref(), Some("Ana"));
    assert_eq!(dishes.next_due.as_deref(), Some("2024-01-01T00:00:00"));
    assert!(dishes.is_overdue);
    assert_eq!(dishes.display_name(), "Dishes (Kitchen)");

    let vacuum = snapshot.chore("7").unwrap();
    assert_eq!(vacuum.title, "Vacuum");
    assert!(!vacuum.is_overdue);
    assert!(vacuum.last_completed().is_some());

    let ben = snapshot.user("u2").unwrap();
    assert_eq!(ben.name, "Ben");
    assert_eq!(ben.points, 30);
}

#[tokio::test]
async fn test_minimal_chore_gets_defaults() {
    let api = ScriptedApi::default();
    *api.chores.lock().unwrap() =
        json!([{"id": "c1", "name": "Dishes", "due_at": "2024-01-01T00:00:00"}, {}]);
    let coordinator = PollingCoordinator::with_default_interval(Arc::new(api));

    let snapshot = coordinator.first_refresh().await.unwrap();
    let chore = &snapshot.chores[0];

    assert_eq!(chore.id, "c1");
    assert_eq!(chore.title, "Dishes");
    assert_eq!(chore.next_due.as_deref(), Some("2024-01-01T00:00:00"));
    assert_eq!(chore.points, None);
    assert_eq!(chore.assigned_to, None);
    assert!(!chore.is_overdue);

    let placeholder = &snapshot.chores[1];
    assert_eq!(placeholder.id, "unknown-1");
    assert_eq!(placeholder.title, "Unknown chore");
}

#[tokio::test]
async fn test_derived_leaderboard_when_upstream_has_none() {
    let coordinator = PollingCoordinator::with_default_interval(Arc::new(ScriptedApi::default()));

    let snapshot = coordinator.first_refresh().await.unwrap();
    let board = &snapshot.leaderboard;

    assert_eq!(board.source, LeaderboardSource::Derived);
    assert_eq!(board.users["u2"].rank, Some(1));
    assert_eq!(board.users["u1"].rank, Some(2));
    assert_eq!(board.users["u1"].streak, 3);
    assert_eq!(board.total_points(), 42);
}

#[tokio::test]
async fn test_upstream_leaderboard_list_uses_position() {
    let api = ScriptedApi::default();
    *api.leaderboard.lock().unwrap() = Some(json!({
        "users": [
            {"user_id": "u2", "points": 30},
            {"user_id": "u1", "points": 12}
        ]
    }));
    let coordinator = PollingCoordinator::with_default_interval(Arc::new(api));

    let snapshot = coordinator.first_refresh().await.unwrap();
    assert_eq!(snapshot.leaderboard.source, LeaderboardSource::Upstream);
    assert_eq!(snapshot.leaderboard.users["u2"].rank, Some(1));
    assert_eq!(snapshot.leaderboard.users["u1"].rank, Some(2));
}

#[tokio::test]
async fn test_partial_failure_keeps_previous_snapshot() {
    let api = Arc::new(ScriptedApi::default());
    let coordinator = PollingCoordinator::with_default_interval(api.clone());
    let mut updates = coordinator.subscribe();

    let first = coordinator.first_refresh().await.unwrap();
    updates.borrow_and_update();

    *api.chores.lock().unwrap() = json!([]);
    api.fail_users.store(true, Ordering::SeqCst);

    let result = coordinator.refresh().await.unwrap();
    assert!(result.is_err());

    assert!(updates.has_changed().unwrap());
    let state = updates.borrow_and_update().clone();
    assert!(!state.last_update_success);
    assert!(state.last_error.unwrap().contains("users unavailable"));

    // The new (empty) chore list was discarded along with the failed users call.
    let current = coordinator.snapshot().unwrap();
    assert!(Arc::ptr_eq(&current, &first));
    assert_eq!(current.chores.len(), 2);

    api.fail_users.store(false, Ordering::SeqCst);
    coordinator.refresh().await.unwrap().unwrap();

    let state = coordinator.state();
    assert!(state.last_update_success);
    assert!(state.last_error.is_none());
    assert!(coordinator.snapshot().unwrap().chores.is_empty());

    let status = coordinator.status();
    assert_eq!(status.refreshes_succeeded, 2);
    assert_eq!(status.refreshes_failed, 1);
}

#[tokio::test]
async fn test_first_refresh_failure_is_returned() {
    let api = ScriptedApi::default();
    api.reject_auth.store(true, Ordering::SeqCst);
    let coordinator = PollingCoordinator::with_default_interval(Arc::new(api));

    let err = coordinator.first_refresh().await.unwrap_err();
    assert!(!err.is_unavailable());
    assert!(coordinator.snapshot().is_none());
}

#[tokio::test]
async fn test_requests_during_refresh_coalesce() {
    let api = Arc::new(ScriptedApi::with_delay(Duration::from_millis(100)));
    let coordinator = Arc::new(PollingCoordinator::with_default_interval(api.clone()));

    let in_flight = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    futures::future::join_all((0..5).map(|_| coordinator.request_refresh())).await;

    in_flight.await.unwrap().unwrap().unwrap();

    assert_eq!(api.fetch_count(), 2);
    assert_eq!(coordinator.status().requests_coalesced, 4);
}

#[tokio::test]
async fn test_scheduled_tick_dropped_during_refresh() {
    let api = Arc::new(ScriptedApi::with_delay(Duration::from_millis(100)));
    let coordinator = Arc::new(PollingCoordinator::with_default_interval(api.clone()));

    let in_flight = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(coordinator.refresh().await.is_none());
    in_flight.await.unwrap().unwrap().unwrap();

    assert_eq!(api.fetch_count(), 1);
    assert_eq!(coordinator.status().ticks_dropped, 1);
}

#[tokio::test]
async fn test_polling_loop_runs_and_stops() {
    let api = Arc::new(ScriptedApi::default());
    let coordinator = Arc::new(PollingCoordinator::new(
        api.clone(),
        Duration::from_millis(30),
    ));

    coordinator.first_refresh().await.unwrap();
    let handle = coordinator.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    coordinator.stop();
    handle.await.unwrap();

    let fetched = api.fetch_count();
    assert!(fetched >= 3, "expected scheduled refreshes, got {fetched}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.fetch_count(), fetched);
}

#[tokio::test]
async fn test_views_render_snapshot() {
    let coordinator = PollingCoordinator::with_default_interval(Arc::new(ScriptedApi::default()));
    let snapshot = coordinator.first_refresh().await.unwrap();

    let views = render(&snapshot);
    let ana = views.iter().find(|v| v.key == "user_u1_points").unwrap();
    assert_eq!(ana.value, json!(12));
    assert_eq!(ana.name, "Ana Points");

    // Two users, three views per chore, one household total.
    assert_eq!(views.len(), 2 + 2 * 3 + 1);

    let complete = views.iter().find(|v| v.key == "chore_c1_complete").unwrap();
    assert_eq!(complete.name, "Complete Dishes");
    assert_eq!(complete.value, json!("u1"));
}

#[tokio::test]
async fn test_naive_completion_timestamp_renders() {
    let api = ScriptedApi::default();
    *api.chores.lock().unwrap() = json!([
        {"id": "c1", "name": "Dishes", "last_completed_at": "2024-01-02T09:30:00"}
    ]);
    let coordinator = PollingCoordinator::with_default_interval(Arc::new(api));
    let snapshot = coordinator.first_refresh().await.unwrap();

    assert!(snapshot.chore("c1").unwrap().last_completed().is_some());

    let views = render(&snapshot);
    let dishes = views.iter().find(|v| v.key == "chore_c1").unwrap();
    assert_eq!(dishes.value, json!("2024-01-02T09:30:00+00:00"));
}
