//! Polling coordinator
//!
//! Owns the current household snapshot for one entry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           PollingCoordinator             │
//! │                                          │
//! │  tick / request_refresh                  │
//! │        │                                 │
//! │        ▼                                 │
//! │  try_join!(info, chores, users, board)   │
//! │        │                                 │
//! │        ▼                                 │
//! │  normalize ──► Arc<Snapshot> ──► watch   │
//! └──────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//!                         views (EntityView)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use flowhome_bridge::coordinator::PollingCoordinator;
//!
//! let coordinator = Arc::new(PollingCoordinator::with_default_interval(api));
//! coordinator.first_refresh().await?;
//! let handle = coordinator.start();
//! ```

pub mod normalize;
pub mod refresh;
pub mod views;

// Re-export main types
pub use refresh::{
    CoordinatorState, CoordinatorStatus, PollingCoordinator, DEFAULT_POLL_INTERVAL,
};
pub use views::{render, views_for, ChoreCompleteAction, EntityView, RenderedView};
