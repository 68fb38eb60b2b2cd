//! HTTP server for the control API and inbound webhooks
//!
//! Serves the routes defined in [`api`] plus the health check in [`health`]
//! for one [`Bridge`].

pub mod api;
pub mod health;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bridge::Bridge;
use crate::config::ServerConfig;

pub use api::{create_router, ApiResponse, ErrorResponse};
pub use health::{ComponentHealth, HealthResponse, HealthStatus};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Bridge Server
// ============================================================================

pub struct BridgeServer {
    bind_address: SocketAddr,
    enable_cors: bool,
    enable_request_logging: bool,
    state: AppState,
}

impl BridgeServer {
    pub fn new(bridge: Arc<Bridge>, config: &ServerConfig) -> Result<Self, ServerError> {
        let bind_address = config
            .bind_address
            .parse()
            .map_err(|e| ServerError::Config(format!("{}: {e}", config.bind_address)))?;

        Ok(Self {
            bind_address,
            enable_cors: config.enable_cors,
            enable_request_logging: config.enable_request_logging,
            state: AppState::new(bridge),
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves
    ///
    /// Connection info is attached to every request so local-only webhooks
    /// can check the caller's address.
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();

        tracing::info!(addr = %self.bind_address, "Starting bridge server");

        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Bridge server shutdown complete");
        Ok(())
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.bind_address,
            entry_id: self.state.bridge.entry_id().to_string(),
            upstream: self.state.bridge.endpoint().canonical_url(),
            cors_enabled: self.enable_cors,
            request_logging_enabled: self.enable_request_logging,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub entry_id: String,
    pub upstream: String,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "FlowHome Bridge\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Entry: {}\n\
             Upstream: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.entry_id,
            self.upstream,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}
