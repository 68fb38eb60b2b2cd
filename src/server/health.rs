//! Health check
//!
//! `GET /api/health` reports liveness plus the outcome of the last refresh.
//! A failed refresh after a good one is `degraded` (stale data is still
//! served); no snapshot at all is `unhealthy`.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;

use crate::bridge::BridgeStatus;
use crate::coordinator::CoordinatorStatus;

use super::AppState;

// ============================================================================
// Health Status Types
// ============================================================================

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Worst of two statuses
    fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Comprehensive health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: String,
    pub checks: Vec<ComponentHealth>,
    pub bridge: BridgeStatus,
}

/// Health of the polling side
pub fn upstream_health(status: &CoordinatorStatus) -> ComponentHealth {
    let (health, message) = match (status.last_success_at, status.last_update_success) {
        (None, _) => (HealthStatus::Unhealthy, status.last_error.clone()),
        (Some(_), true) => (HealthStatus::Healthy, None),
        (Some(at), false) => (
            HealthStatus::Degraded,
            Some(format!(
                "serving snapshot from {}: {}",
                at.to_rfc3339(),
                status.last_error.as_deref().unwrap_or("refresh failed")
            )),
        ),
    };

    ComponentHealth {
        name: "upstream".to_string(),
        status: health,
        message,
    }
}

pub(super) async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let bridge = state.bridge.status().await;

    let checks = vec![
        upstream_health(&bridge.coordinator),
        ComponentHealth {
            name: "webhooks".to_string(),
            status: HealthStatus::Healthy,
            message: Some(format!("{} registered", bridge.webhooks)),
        },
    ];

    let status = checks
        .iter()
        .fold(HealthStatus::Healthy, |acc, c| acc.worst(c.status));

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
        checks,
        bridge,
    };

    (status.status_code(), Json(response))
}
