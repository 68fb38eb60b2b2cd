//! REST API handlers
//!
//! | Method | Path | Action |
//! |---|---|---|
//! | GET | /api/health | liveness + last refresh status |
//! | GET | /api/snapshot | current snapshot |
//! | GET | /api/entities | presentation views |
//! | POST | /api/refresh | on-demand refresh |
//! | POST | /api/chores/{id}/complete | complete a chore |
//! | POST | /api/chores/{id}/quick-complete | complete for the default user |
//! | POST | /api/chores/{id}/skip | skip a chore |
//! | GET, POST | /api/webhooks | list / register webhooks |
//! | DELETE | /api/webhooks/{id} | unregister a webhook |
//! | POST | /api/webhook/{id} | inbound webhook |
//! | GET | /metrics | Prometheus text format |

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::coordinator::render;
use crate::error::{DispatchError, Error, UpstreamError};
use crate::metrics;
use crate::webhooks::{InboundRequest, DEFAULT_LOCAL_ONLY, DEFAULT_WEBHOOK_NAME};

use super::health::health_check;
use super::AppState;

/// Largest inbound webhook body accepted
pub const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            category: None,
        }
    }
}

/// HTTP status for a bridge error
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Upstream(UpstreamError::Unavailable { .. }) => StatusCode::BAD_GATEWAY,
        Error::Upstream(UpstreamError::AuthenticationRejected { .. }) => StatusCode::UNAUTHORIZED,
        Error::Dispatch(DispatchError::InvalidId(_)) | Error::Endpoint(_) => StatusCode::BAD_REQUEST,
        Error::Dispatch(DispatchError::AlreadyBound(_)) => StatusCode::CONFLICT,
        Error::Storage(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Json(_) | Error::Config(_) | Error::Other { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(error: Error) -> Response {
    use crate::error::BridgeErrorTrait;

    let status = status_for(&error);
    tracing::warn!(status = status.as_u16(), error = %error, "Request failed");

    let body = ErrorResponse {
        category: Some(error.category().as_str()),
        ..ErrorResponse::new(error.to_string())
    };
    (status, Json(body)).into_response()
}

/// Body of `POST /api/chores/{id}/complete`
#[derive(Debug, Deserialize)]
pub struct CompleteChoreRequest {
    pub user_id: String,
}

/// Body of `POST /api/chores/{id}/skip`
#[derive(Debug, Deserialize)]
pub struct SkipChoreRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of `POST /api/webhooks`
#[derive(Debug, Default, Deserialize)]
pub struct RegisterWebhookRequest {
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub local_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponse {
    pub webhook_id: String,
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/entities", get(get_entities))
        .route("/api/refresh", post(refresh))
        .route("/api/chores/{id}/complete", post(complete_chore))
        .route("/api/chores/{id}/quick-complete", post(quick_complete_chore))
        .route("/api/chores/{id}/skip", post(skip_chore))
        .route("/api/webhooks", get(list_webhooks).post(register_webhook))
        .route("/api/webhooks/{id}", delete(unregister_webhook))
        .route("/api/webhook/{id}", post(receive_webhook))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// ============================================================================
// Snapshot Handlers
// ============================================================================

async fn get_snapshot(State(state): State<AppState>) -> Response {
    match state.bridge.snapshot() {
        Some(snapshot) => Json(ApiResponse::success(snapshot)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("No snapshot available yet")),
        )
            .into_response(),
    }
}

async fn get_entities(State(state): State<AppState>) -> Response {
    match state.bridge.snapshot() {
        Some(snapshot) => Json(ApiResponse::success(render(&snapshot))).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("No snapshot available yet")),
        )
            .into_response(),
    }
}

async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.bridge.refresh_now().await))
}

// ============================================================================
// Chore Handlers
// ============================================================================

async fn complete_chore(
    State(state): State<AppState>,
    Path(chore_id): Path<String>,
    Json(request): Json<CompleteChoreRequest>,
) -> Response {
    match state
        .bridge
        .complete_chore(&chore_id, &request.user_id)
        .await
    {
        Ok(()) => Json(ApiResponse::success(chore_id)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn quick_complete_chore(
    State(state): State<AppState>,
    Path(chore_id): Path<String>,
) -> Response {
    match state.bridge.quick_complete(&chore_id).await {
        Ok(user_id) => Json(ApiResponse::success(user_id)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn skip_chore(
    State(state): State<AppState>,
    Path(chore_id): Path<String>,
    Json(request): Json<SkipChoreRequest>,
) -> Response {
    match state
        .bridge
        .skip_chore(&chore_id, &request.user_id, request.reason.as_deref())
        .await
    {
        Ok(()) => Json(ApiResponse::success(chore_id)).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

async fn list_webhooks(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.bridge.webhooks().await))
}

async fn register_webhook(
    State(state): State<AppState>,
    body: Option<Json<RegisterWebhookRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let name = request
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(DEFAULT_WEBHOOK_NAME);

    match state
        .bridge
        .register_webhook(
            name,
            request.local_only.unwrap_or(DEFAULT_LOCAL_ONLY),
            request.webhook_id.as_deref(),
        )
        .await
    {
        Ok(registration) => Json(ApiResponse::success(registration)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn unregister_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
) -> Response {
    match state.bridge.unregister_webhook(&webhook_id).await {
        Ok(removed) => Json(ApiResponse::success(UnregisterResponse {
            webhook_id,
            removed,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Inbound webhook; always acknowledged with 200
async fn receive_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    request: Request,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let query: HashMap<String, String> = request
        .uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let body = match axum::body::to_bytes(request.into_body(), MAX_WEBHOOK_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(webhook_id = %webhook_id, error = %e, "Failed to read webhook body");
            Default::default()
        }
    };

    let outcome = state
        .bridge
        .handle_webhook(
            &webhook_id,
            InboundRequest {
                body,
                query,
                remote,
            },
        )
        .await;

    let status = StatusCode::from_u16(outcome.status()).unwrap_or(StatusCode::OK);
    (status, Json(WebhookAck { received: true })).into_response()
}

// ============================================================================
// Metrics Handler
// ============================================================================

async fn metrics_handler() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(text))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
