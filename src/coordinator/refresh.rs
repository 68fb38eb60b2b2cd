//! Polling coordinator
//!
//! Periodically fetches info, chores, users and leaderboard in parallel,
//! normalizes them and publishes one immutable [`Snapshot`] per successful
//! refresh. Subscribers see either the new snapshot or the previous one.
//!
//! Refreshes are strictly serialized:
//! - a scheduled tick that finds a refresh in flight is dropped;
//! - on-demand requests issued while a refresh is in flight collapse into a
//!   single follow-up refresh.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::client::{UpstreamApi, UpstreamError};
use crate::metrics;
use crate::models::Snapshot;

use super::normalize::{derive_leaderboard, normalize_chores, normalize_leaderboard, normalize_users};

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Version reported when `/info` carries none
pub const UNKNOWN_VERSION: &str = "unknown";

// ============================================================================
// Published state
// ============================================================================

/// What subscribers observe after every refresh attempt
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorState {
    /// Last good snapshot; kept across failed refreshes
    pub snapshot: Option<Arc<Snapshot>>,

    /// Outcome of the most recent attempt
    pub last_update_success: bool,

    /// Error text of the most recent failed attempt
    pub last_error: Option<String>,

    /// When the most recent attempt finished
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Counters for health reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorStatus {
    pub refreshes_succeeded: u64,
    pub refreshes_failed: u64,
    pub ticks_dropped: u64,
    pub requests_coalesced: u64,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub interval_secs: u64,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Fixed-interval poller that owns the current snapshot
pub struct PollingCoordinator {
    api: Arc<dyn UpstreamApi>,
    interval: Duration,

    state_tx: watch::Sender<CoordinatorState>,

    /// Held for the duration of one refresh
    refresh_lock: Mutex<()>,

    /// Set by on-demand requests, cleared by the refresh that serves them
    pending: AtomicBool,

    shutdown: watch::Sender<bool>,

    succeeded: AtomicU64,
    failed: AtomicU64,
    ticks_dropped: AtomicU64,
    coalesced: AtomicU64,
}

impl PollingCoordinator {
    /// Create a coordinator polling `api` every `interval`
    pub fn new(api: Arc<dyn UpstreamApi>, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::default());
        let (shutdown, _) = watch::channel(false);

        Self {
            api,
            interval,
            state_tx,
            refresh_lock: Mutex::new(()),
            pending: AtomicBool::new(false),
            shutdown,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Create a coordinator with the default 30 s interval
    pub fn with_default_interval(api: Arc<dyn UpstreamApi>) -> Self {
        Self::new(api, DEFAULT_POLL_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Initial refresh performed during setup
    ///
    /// Unlike scheduled refreshes, a failure here is returned to the caller
    /// so setup can be aborted.
    pub async fn first_refresh(&self) -> Result<Arc<Snapshot>, UpstreamError> {
        let guard = self.refresh_lock.lock().await;
        let result = self.refresh_inner().await;
        drop(guard);

        self.drain_pending().await;
        result
    }

    /// Scheduled refresh
    ///
    /// Returns `None` when another refresh was already in flight and this
    /// tick was dropped.
    pub async fn refresh(&self) -> Option<Result<Arc<Snapshot>, UpstreamError>> {
        let Ok(guard) = self.refresh_lock.try_lock() else {
            self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Refresh already in flight, dropping tick");
            return None;
        };

        // A tick serves whatever on-demand requests are already waiting.
        let pending = PendingClaim::take(&self.pending);
        let result = self.refresh_inner().await;
        pending.served();
        drop(guard);

        self.drain_pending().await;
        Some(result)
    }

    /// On-demand refresh, e.g. after a mutating call
    ///
    /// Returns once the request has either been served or handed to the
    /// refresh currently in flight. If the caller is cancelled while serving,
    /// the request stays pending for the next tick or request.
    pub async fn request_refresh(&self) {
        if self.pending.swap(true, Ordering::SeqCst) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        self.drain_pending().await;
    }

    /// Run refreshes while requests are pending and nobody else holds the lock
    async fn drain_pending(&self) {
        // The lock holder re-checks `pending` after releasing, so a request
        // that lost the try_lock race is never stranded.
        while self.pending.load(Ordering::SeqCst) {
            let Ok(guard) = self.refresh_lock.try_lock() else {
                return;
            };

            let pending = PendingClaim::take(&self.pending);
            if pending.claimed {
                // Failures are already published to subscribers.
                let _ = self.refresh_inner().await;
            }
            pending.served();

            drop(guard);
        }
    }

    async fn refresh_inner(&self) -> Result<Arc<Snapshot>, UpstreamError> {
        let started = Instant::now();

        match self.fetch_snapshot().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                metrics::record_refresh(true, started.elapsed());

                tracing::debug!(
                    chores = snapshot.chores.len(),
                    users = snapshot.users.len(),
                    derived_leaderboard = snapshot.leaderboard.is_derived(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Refresh succeeded"
                );

                let published = Arc::clone(&snapshot);
                self.state_tx.send_modify(|state| {
                    state.snapshot = Some(published);
                    state.last_update_success = true;
                    state.last_error = None;
                    state.last_attempt_at = Some(Utc::now());
                });

                Ok(snapshot)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_refresh(false, started.elapsed());

                tracing::warn!(error = %e, "Refresh failed, keeping previous snapshot");

                let message = e.to_string();
                self.state_tx.send_modify(|state| {
                    state.last_update_success = false;
                    state.last_error = Some(message);
                    state.last_attempt_at = Some(Utc::now());
                });

                Err(e)
            }
        }
    }

    /// Fetch all four resources concurrently; any failure discards the rest
    async fn fetch_snapshot(&self) -> Result<Snapshot, UpstreamError> {
        let (info, chores, users, leaderboard) = tokio::try_join!(
            self.api.get_info(),
            self.api.get_chores(),
            self.api.get_users(),
            self.api.get_leaderboard(),
        )?;

        let info = match info {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                tracing::debug!(payload = %other, "Non-object /info payload ignored");
                Map::new()
            }
        };

        let version = info
            .get("version")
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());

        let chores = normalize_chores(&chores);
        let users = normalize_users(&users);
        let leaderboard = leaderboard
            .as_ref()
            .and_then(normalize_leaderboard)
            .unwrap_or_else(|| derive_leaderboard(&users));

        Ok(Snapshot {
            info,
            chores,
            users,
            leaderboard,
            version,
            fetched_at: Utc::now(),
        })
    }

    /// Spawn the fixed-interval polling loop
    ///
    /// The first tick fires one interval after start; the initial refresh
    /// is expected to have been done by [`first_refresh`](Self::first_refresh).
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(coordinator.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            tracing::info!(
                interval_secs = coordinator.interval.as_secs(),
                "Polling loop started"
            );

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        coordinator.refresh().await;
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            tracing::info!("Polling loop stopped");
        })
    }

    /// Stop the polling loop
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Current published state
    pub fn state(&self) -> CoordinatorState {
        self.state_tx.borrow().clone()
    }

    /// Last good snapshot
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.state_tx.borrow().snapshot.clone()
    }

    pub fn status(&self) -> CoordinatorStatus {
        let state = self.state_tx.borrow();

        CoordinatorStatus {
            refreshes_succeeded: self.succeeded.load(Ordering::Relaxed),
            refreshes_failed: self.failed.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            requests_coalesced: self.coalesced.load(Ordering::Relaxed),
            last_update_success: state.last_update_success,
            last_error: state.last_error.clone(),
            last_success_at: state.snapshot.as_ref().map(|s| s.fetched_at),
            interval_secs: self.interval.as_secs(),
        }
    }
}

/// Claim on the pending flag; put back if dropped before the refresh finished
struct PendingClaim<'a> {
    pending: &'a AtomicBool,
    claimed: bool,
}

impl<'a> PendingClaim<'a> {
    fn take(pending: &'a AtomicBool) -> Self {
        let claimed = pending.swap(false, Ordering::SeqCst);
        Self { pending, claimed }
    }

    fn served(mut self) {
        self.claimed = false;
    }
}

impl Drop for PendingClaim<'_> {
    fn drop(&mut self) {
        if self.claimed {
            self.pending.store(true, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for PollingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingCoordinator")
            .field("interval", &self.interval)
            .field("status", &self.status())
            .finish()
    }
}
