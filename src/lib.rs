//! flowhome-bridge - FlowHome household-chore bridge
//!
//! Polls a FlowHome service, publishes normalized household snapshots and
//! relays inbound webhook callbacks to a home automation host.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`endpoint`] - Resolution of connection input into a canonical endpoint
//! - [`client`] - Upstream REST client
//! - [`coordinator`] - Polling, normalization and presentation views
//! - [`webhooks`] - Inbound webhook dispatch, persistence and events
//! - [`relay`] - Forwarding of webhook events to the automation host
//! - [`bridge`] - Per-entry context tying the above together
//! - [`server`] - Control API and webhook listener
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use flowhome_bridge::bridge::Bridge;
//! use flowhome_bridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let bridge = Bridge::setup(&config).await?;
//!     println!("{} chores", bridge.snapshot().map_or(0, |s| s.chores.len()));
//!     bridge.unload().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod models;
pub mod relay;
pub mod server;
pub mod webhooks;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bridge::Bridge;
    pub use crate::client::{ClientConfig, UpstreamApi, UpstreamClient};
    pub use crate::config::Config;
    pub use crate::coordinator::PollingCoordinator;
    pub use crate::endpoint::{resolve, Endpoint};
    pub use crate::error::{BridgeErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{Chore, Leaderboard, Registration, Snapshot, User, WebhookInfo};
    pub use crate::webhooks::{WebhookEvent, WebhookRegistry};
}

// Direct re-exports for convenience
pub use models::{Chore, Snapshot, User};
