//! API routes for sidecard

use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use sidecar_common::SidecarError;
use std::sync::Arc;
use tracing::error;

type AppStateArc = Arc<AppState>;

/// `SidecarError` rendered as a plain-text HTTP error.
pub struct ApiError(pub SidecarError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, format!("{} - {}", status.as_u16(), self.0)).into_response()
    }
}

// ============================================================================
// Heartbeat Routes
// ============================================================================

pub fn heartbeat_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/sessionHosts/:session_host_id", patch(heartbeat))
        .route("/v1/sessionHosts/:session_host_id/heartbeats", post(heartbeat))
}

/// The cycle runs on its own task so a caller hanging up cannot abort a
/// patch half way.
async fn heartbeat(
    State(state): State<AppStateArc>,
    Path(session_host_id): Path<String>,
    body: Bytes,
) -> Response {
    let service = state.service.clone();
    let task =
        tokio::spawn(async move { service.handle_raw(&session_host_id, &body).await });

    match task.await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(e) => {
            error!("Heartbeat task aborted: {}", e);
            ApiError(SidecarError::Internal(e.to_string())).into_response()
        }
    }
}

// ============================================================================
// Metrics Routes
// ============================================================================

pub fn metrics_routes() -> Router<AppStateArc> {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics(State(state): State<AppStateArc>) -> Response {
    match state.metrics.export() {
        Ok(text) => text.into_response(),
        Err(e) => ApiError(SidecarError::Internal(e.to_string())).into_response(),
    }
}
