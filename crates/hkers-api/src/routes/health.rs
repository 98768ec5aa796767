//! Liveness endpoint

use crate::response::ApiResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

/// Health payload.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Always "healthy" while the process serves requests
    pub status: &'static str,

    /// Server name
    pub message: &'static str,

    /// Whether the identity provider is available
    pub oidc_configured: bool,
}

/// `GET|HEAD /health`
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    ApiResponse::ok(HealthStatus {
        status: "healthy",
        message: "HKERS API Server",
        oidc_configured: state.flow.is_configured(),
    })
}
