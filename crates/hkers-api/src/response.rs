//! JSON envelope and error conversion
//!
//! Every response body is `{success, data?, error?}`. Auth failures are
//! converted to that shape here and nowhere else.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hkers_auth::{AccessDenial, AuthError};
use serde::Serialize;
use tracing::{error, info, warn};

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded
    pub success: bool,

    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Human-readable error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful envelope.
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

impl ApiResponse<()> {
    /// Failed envelope.
    pub fn failure(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.into()),
        })
    }
}

/// Handler error.
#[derive(Debug)]
pub enum ApiError {
    /// Auth core failure
    Auth(AuthError),

    /// Account gating refused the login
    Denied(AccessDenial),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<AccessDenial> for ApiError {
    fn from(denial: AccessDenial) -> Self {
        ApiError::Denied(denial)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auth(err) => {
                if err.is_server_error() {
                    error!(code = err.error_code(), error = %err, "Request failed");
                } else {
                    warn!(code = err.error_code(), error = %err, "Request rejected");
                }
                (err.status_code(), err.public_message())
            }
            ApiError::Denied(denial) => {
                info!(?denial, "Login denied by account gating");
                (AccessDenial::STATUS, denial.message().to_string())
            }
        };

        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, ApiResponse::failure(message)).into_response()
    }
}
