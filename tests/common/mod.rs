//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use flowhome_bridge::client::{UpstreamApi, UpstreamError};
use flowhome_bridge::config::Config;

/// Upstream double with scripted payloads and call counters
pub struct ScriptedApi {
    pub info: Mutex<Value>,
    pub chores: Mutex<Value>,
    pub users: Mutex<Value>,
    pub leaderboard: Mutex<Option<Value>>,
    pub fail_users: AtomicBool,
    pub reject_auth: AtomicBool,
    pub delay: Duration,
    pub fetches: AtomicUsize,
    pub completed: Mutex<Vec<(String, String)>>,
    pub skipped: Mutex<Vec<(String, String, String)>>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self {
            info: Mutex::new(json!({"household_name": "Casa Verde", "version": "1.4.2"})),
            chores: Mutex::new(sample_chores()),
            users: Mutex::new(sample_users()),
            leaderboard: Mutex::new(None),
            fail_users: AtomicBool::new(false),
            reject_auth: AtomicBool::new(false),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
            skipped: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedApi {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl UpstreamApi for ScriptedApi {
    async fn get_info(&self) -> Result<Value, UpstreamError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(UpstreamError::AuthenticationRejected { status: 401 });
        }
        Ok(self.info.lock().unwrap().clone())
    }

    async fn get_chores(&self) -> Result<Value, UpstreamError> {
        self.pause().await;
        Ok(self.chores.lock().unwrap().clone())
    }

    async fn get_users(&self) -> Result<Value, UpstreamError> {
        self.pause().await;
        if self.fail_users.load(Ordering::SeqCst) {
            return Err(UpstreamError::status(500, "users unavailable"));
        }
        Ok(self.users.lock().unwrap().clone())
    }

    async fn get_leaderboard(&self) -> Result<Option<Value>, UpstreamError> {
        self.pause().await;
        Ok(self.leaderboard.lock().unwrap().clone())
    }

    async fn complete_chore(&self, chore_id: &str, user_id: &str) -> Result<(), UpstreamError> {
        if chore_id == "missing" {
            return Err(UpstreamError::status(404, "no such chore"));
        }
        self.completed
            .lock()
            .unwrap()
            .push((chore_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn skip_chore(
        &self,
        chore_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), UpstreamError> {
        self.skipped.lock().unwrap().push((
            chore_id.to_string(),
            user_id.to_string(),
            reason.to_string(),
        ));
        Ok(())
    }
}

pub fn sample_chores() -> Value {
    json!({
        "chores": [
            {
                "id": "c1",
                "name": "Dishes",
                "room": "Kitchen",
                "points": "5",
                "assigned_to": {"id": "u1", "name": "Ana"},
                "due_at": "2024-01-01T00:00:00",
                "is_overdue": "yes"
            },
            {
                "chore_id": 7,
                "title": "Vacuum",
                "last_completed_at": "2024-01-02T09:30:00Z"
            }
        ]
    })
}

pub fn sample_users() -> Value {
    json!([
        {"id": "u1", "name": "Ana", "points": 12, "streak": 3},
        {"user_id": "u2", "display_name": "Ben", "total_points": "30"}
    ])
}

/// Config pointing at a local test setup with storage under `storage_dir`
pub fn test_config(storage_dir: &Path) -> Config {
    let mut config = Config::default();
    config.upstream.host = "http://flowhome.test:8080".to_string();
    config.polling.interval_secs = 3600;
    config.webhooks.entry_id = Some("home".to_string());
    config.webhooks.storage_dir = storage_dir.to_path_buf();
    config.webhooks.external_url = Some("http://bridge.test:8099".to_string());
    config.server.enable_request_logging = false;
    config
}
